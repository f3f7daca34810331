use crate::core::config::Config;
use crate::core::state::Voice;
use anyhow::{anyhow, Result};
use inquire::Select;
use std::path::Path;

/// Fills in interactive settings missing from the config and saves it.
pub fn run_setup(config: &mut Config, path: &Path) -> Result<()> {
    let mut needs_save = false;

    if config.audio.voice.is_none() {
        let voice = if config.unattended {
            Voice::default()
        } else {
            select_voice("Select Narrator Voice:", &config.language)?
        };
        config.audio.voice = Some(voice);
        needs_save = true;
    }

    if needs_save {
        config.save(path)?;
        println!("Configuration saved.");
    }

    Ok(())
}

pub fn voice_label(voice: Voice, lang: &str) -> String {
    format!("{} - {}", voice, voice.preview_phrase(lang))
}

pub fn select_voice(prompt: &str, lang: &str) -> Result<Voice> {
    let options: Vec<String> = Voice::ALL.iter().map(|v| voice_label(*v, lang)).collect();

    let selection = Select::new(prompt, options).prompt()?;

    let name = selection
        .split_whitespace()
        .next()
        .ok_or_else(|| anyhow!("Empty voice selection"))?;
    name.parse()
}
