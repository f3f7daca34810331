use crate::core::error::ProviderError;
use crate::core::state::{ChapterStub, SceneScript, Voice};
use async_trait::async_trait;

/// What a speech backend answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutput {
    /// Raw 16-bit little-endian mono PCM.
    Pcm(Vec<u8>),
    /// The model replied with text instead of synthesizing.
    Text(String),
}

/// Capabilities of the external generative-content backend.
///
/// Implementations are stateless from the caller's point of view; retrying and
/// backend fallback are layered on top by `retry` and `tts`.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate_outline(&self, topic: &str) -> Result<Vec<ChapterStub>, ProviderError>;

    async fn generate_scene_scripts(
        &self,
        topic: &str,
        chapter_title: &str,
    ) -> Result<Vec<SceneScript>, ProviderError>;

    /// Returns an image reference (URI).
    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Synthesizes `script` with one specific speech `model`.
    async fn generate_audio(
        &self,
        model: &str,
        script: &str,
        voice: Voice,
    ) -> Result<SpeechOutput, ProviderError>;
}
