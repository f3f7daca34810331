pub mod gemini;
pub mod playback;
pub mod provider;
pub mod retry;
pub mod session;
pub mod setup;
pub mod tts;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
