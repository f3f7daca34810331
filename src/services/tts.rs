use crate::core::config::{AudioConfig, RetryPolicy};
use crate::core::error::ProviderError;
use crate::core::state::Voice;
use crate::services::provider::{GenerationProvider, SpeechOutput};
use crate::utils::audio::{data_uri, pcm_to_wav};
use log::{debug, warn};
use std::sync::Arc;

/// Ordered list of speech models tried until one produces audio.
pub struct SpeechFallbackChain {
    provider: Arc<dyn GenerationProvider>,
    backends: Vec<String>,
    policy: RetryPolicy,
    sample_rate: u32,
}

impl SpeechFallbackChain {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        backends: Vec<String>,
        policy: RetryPolicy,
        sample_rate: u32,
    ) -> Self {
        Self {
            provider,
            backends,
            policy,
            sample_rate,
        }
    }

    pub fn from_config(provider: Arc<dyn GenerationProvider>, audio: &AudioConfig) -> Self {
        Self::new(
            provider,
            audio.backends.clone(),
            audio.fast_fail,
            audio.sample_rate,
        )
    }

    pub fn backends(&self) -> &[String] {
        &self.backends
    }

    /// Returns a playable `data:audio/wav` URI. Fails with the error of the
    /// last backend tried when none of them succeeds.
    pub async fn synthesize(&self, script: &str, voice: Voice) -> Result<String, ProviderError> {
        let mut last_error = ProviderError::new("No speech backends configured");
        let provider = self.provider.as_ref();

        for backend in &self.backends {
            let attempt = self
                .policy
                .execute(move || async move {
                    match provider.generate_audio(backend, script, voice).await? {
                        SpeechOutput::Pcm(pcm) if !pcm.is_empty() => Ok(pcm),
                        SpeechOutput::Pcm(_) => Err(ProviderError::new(format!(
                            "{} returned an empty audio payload",
                            backend
                        ))),
                        SpeechOutput::Text(text) => Err(ProviderError::new(format!(
                            "{} answered with text instead of audio: {}",
                            backend,
                            text.chars().take(200).collect::<String>()
                        ))),
                    }
                })
                .await;

            match attempt {
                Ok(pcm) => {
                    debug!("Synthesized {} bytes of PCM with {}", pcm.len(), backend);
                    let wav = pcm_to_wav(&pcm, self.sample_rate, 1, 16);
                    return Ok(data_uri("audio/wav", &wav));
                }
                Err(e) => {
                    warn!("Speech backend {} failed: {}", backend, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
