use crate::core::config::{Config, RetryPolicy};
use crate::core::error::{GenerationError, ProviderError};
use crate::core::state::{Chapter, ChapterContent, Scene, Voice};
use crate::services::provider::GenerationProvider;
use crate::services::tts::SpeechFallbackChain;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

pub const SCENES_PER_CHAPTER: usize = 3;

/// Supplies the narration voice at the moment a scene is synthesized.
pub trait VoiceSource: Send + Sync {
    fn current_voice(&self) -> Voice;
}

impl VoiceSource for Voice {
    fn current_voice(&self) -> Voice {
        *self
    }
}

/// Drives script, image and audio generation for one chapter.
///
/// Scenes are produced strictly one after another. The first failing stage
/// aborts the run and nothing of the partial scene list is returned.
pub struct ChapterOrchestrator {
    provider: Arc<dyn GenerationProvider>,
    speech: SpeechFallbackChain,
    policy: RetryPolicy,
    settle_delay: Duration,
}

impl ChapterOrchestrator {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        speech: SpeechFallbackChain,
        policy: RetryPolicy,
        settle_delay: Duration,
    ) -> Self {
        Self {
            provider,
            speech,
            policy,
            settle_delay,
        }
    }

    pub fn from_config(provider: Arc<dyn GenerationProvider>, config: &Config) -> Self {
        let speech = SpeechFallbackChain::from_config(provider.clone(), &config.audio);
        Self::new(provider, speech, config.retry, config.audio.settle_delay())
    }

    pub async fn generate(
        &self,
        topic: &str,
        chapter: &Chapter,
        voices: &dyn VoiceSource,
    ) -> Result<ChapterContent, GenerationError> {
        let provider = self.provider.as_ref();
        let title = chapter.title.as_str();

        info!("Generating scripts for chapter: {}", title);
        let mut scripts = self
            .policy
            .execute(move || provider.generate_scene_scripts(topic, title))
            .await
            .map_err(GenerationError::Script)?;

        if scripts.len() < SCENES_PER_CHAPTER {
            return Err(GenerationError::Script(ProviderError::new(format!(
                "expected {} scenes, got {}",
                SCENES_PER_CHAPTER,
                scripts.len()
            ))));
        }
        scripts.truncate(SCENES_PER_CHAPTER);

        let mut scenes = Vec::with_capacity(SCENES_PER_CHAPTER);
        for (i, entry) in scripts.into_iter().enumerate() {
            let scene = i + 1;

            debug!("[{}] scene {}: image", title, scene);
            let prompt = entry.image_prompt.as_str();
            let image_url = self
                .policy
                .execute(move || provider.generate_image(prompt))
                .await
                .map_err(|source| GenerationError::Image { scene, source })?;

            tokio::time::sleep(self.settle_delay).await;

            let voice = voices.current_voice();
            debug!("[{}] scene {}: audio with {}", title, scene, voice);
            let audio_url = self
                .speech
                .synthesize(&entry.script, voice)
                .await
                .map_err(|source| GenerationError::Audio { scene, source })?;

            scenes.push(Scene {
                script: entry.script,
                image_prompt: entry.image_prompt,
                image_url,
                audio_url,
            });
            info!("[{}] scene {}/{} ready", title, scene, SCENES_PER_CHAPTER);
        }

        Ok(ChapterContent { scenes })
    }
}
