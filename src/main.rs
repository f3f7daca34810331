use anyhow::{anyhow, Result};
use clap::Parser;
use docugen::core::config::{Config, DEFAULT_CONFIG_PATH};
use docugen::core::state::{ChapterStatus, Scene, Voice};
use docugen::services::gemini::GeminiProvider;
use docugen::services::playback::{Advance, PlaybackSequencer};
use docugen::services::session::Session;
use docugen::services::setup::{self, voice_label};
use docugen::utils::audio::{decode_data_uri, wav_duration};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, Text};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Turn a topic into a narrated, illustrated documentary and play it.
#[derive(Parser, Debug)]
#[command(name = "docugen", version, about)]
struct Cli {
    /// Path to config.yml
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Documentary topic; prompted for when omitted
    #[arg(short, long)]
    topic: Option<String>,

    /// Narration voice (Kore, Puck, Charon, Fenrir)
    #[arg(long)]
    voice: Option<String>,

    /// Don't wait for each scene's audio duration
    #[arg(long)]
    no_realtime: bool,

    /// Print the available voices and exit
    #[arg(long)]
    list_voices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("docugen=info"))
        .init();
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure '{}' exists with a Gemini API key.", cli.config.display());
            return Err(e);
        }
    };

    if cli.list_voices {
        for voice in Voice::ALL {
            println!("{}", voice_label(voice, &config.language));
        }
        return Ok(());
    }

    if let Some(name) = &cli.voice {
        config.audio.voice = Some(name.parse()?);
    }
    setup::run_setup(&mut config, &cli.config)?;
    if cli.no_realtime {
        config.playback.realtime = false;
    }

    let provider = Arc::new(GeminiProvider::new(&config)?);
    let session = Session::new(config.clone(), provider);

    let topic = match cli.topic {
        Some(topic) => topic,
        None => Text::new("Documentary topic:").prompt()?,
    };

    let pb = spinner(format!("Planning \"{}\"", topic))?;
    let started = session.start(&topic).await;
    pb.finish_and_clear();
    if let Err(e) = started {
        let message = session.last_error().unwrap_or_else(|| e.to_string());
        eprintln!("{}", message);
        return Err(anyhow!(e));
    }

    let chapters = session.chapters();
    println!("\n{}", topic);
    for (i, chapter) in chapters.iter().enumerate() {
        println!("  {}. {}: {}", i + 1, chapter.title, chapter.description);
    }
    println!();

    let mut player = PlaybackSequencer::new(session.clone());
    let first = chapters
        .first()
        .ok_or_else(|| anyhow!("Outline contained no chapters"))?;
    player.select(&first.id);

    play(&session, &mut player, &config).await?;
    println!("\nThe End.");
    Ok(())
}

async fn play(
    session: &Arc<Session>,
    player: &mut PlaybackSequencer,
    config: &Config,
) -> Result<()> {
    let mut announced: Option<String> = None;

    while player.is_playing() {
        let Some(chapter) = player.active_chapter() else {
            break;
        };

        match chapter.status {
            ChapterStatus::Pending | ChapterStatus::Generating => {
                // No-op when the chapter is already generating.
                session.spawn_generation(&chapter.id);
                let pb = spinner(format!("Generating \"{}\"", chapter.title))?;
                let settled = session.wait_until_settled(&chapter.id).await;
                pb.finish_and_clear();
                if settled.is_none() {
                    break;
                }
                continue;
            }
            ChapterStatus::Error => {
                eprintln!(
                    "Chapter \"{}\" failed: {}",
                    chapter.title,
                    chapter.error_message.as_deref().unwrap_or_default()
                );
                if let Some(suggestion) = &chapter.error_suggestion {
                    eprintln!("  {}", suggestion);
                }
                let retry = !config.unattended
                    && Confirm::new("Retry this chapter?").with_default(true).prompt()?;
                if retry {
                    session.retry(&chapter.id);
                } else {
                    info!("Skipping chapter {:?}", chapter.title);
                    player.advance_chapter();
                }
                continue;
            }
            ChapterStatus::Ready => {}
        }

        if announced.as_deref() != Some(chapter.id.as_str()) {
            println!("== {} ==", chapter.title);
            announced = Some(chapter.id.clone());
        }

        if let (Some(scene), Some(cursor)) = (player.active_scene(), player.cursor()) {
            present(&scene, cursor.scene_index, config.playback.realtime).await?;
        }

        if player.advance_scene() == Advance::Stopped {
            info!("Playback finished");
        }
    }

    Ok(())
}

async fn present(scene: &Scene, index: usize, realtime: bool) -> Result<()> {
    let (_, image) = decode_data_uri(&scene.image_url)?;
    let (_, audio) = decode_data_uri(&scene.audio_url)?;
    let duration = wav_duration(&audio)?;

    println!("  [{}] {}", index + 1, scene.script);
    println!(
        "      image {} KiB, narration {:.1}s",
        image.len() / 1024,
        duration.as_secs_f32()
    );

    if realtime {
        tokio::time::sleep(duration).await;
    }
    Ok(())
}

fn spinner(message: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}
