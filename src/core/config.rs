use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::state::Voice;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_chapter_count")]
    pub chapter_count: usize,

    #[serde(default)]
    pub unattended: bool,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Bounded exponential backoff. Pure configuration; every executor run keeps
/// its own countdown.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Short policy for a single speech backend; the fallback chain is the
    /// larger safety net there.
    pub fn fast_fail() -> Self {
        Self {
            max_retries: 1,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_gemini_base_url(),
            text_model: default_text_model(),
            image_model: default_image_model(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AudioConfig {
    /// Narration voice; asked for interactively when unset.
    #[serde(default)]
    pub voice: Option<Voice>,
    /// Speech models in priority order, most capable first.
    #[serde(default = "default_audio_backends")]
    pub backends: Vec<String>,
    #[serde(default = "RetryPolicy::fast_fail")]
    pub fast_fail: RetryPolicy,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            voice: None,
            backends: default_audio_backends(),
            fast_fail: RetryPolicy::fast_fail(),
            settle_delay_ms: default_settle_delay_ms(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl AudioConfig {
    pub fn voice(&self) -> Voice {
        self.voice.unwrap_or_default()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaybackConfig {
    #[serde(default = "default_realtime")]
    pub realtime: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            realtime: default_realtime(),
        }
    }
}

fn default_language() -> String {
    "zh".to_string()
}
fn default_chapter_count() -> usize {
    8
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    2000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_text_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}
fn default_audio_backends() -> Vec<String> {
    vec![
        "gemini-2.5-pro-preview-tts".to_string(),
        "gemini-2.5-flash-preview-tts".to_string(),
    ]
}
fn default_settle_delay_ms() -> u64 {
    500
}
fn default_sample_rate() -> u32 {
    24_000
}
fn default_realtime() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: default_language(),
            chapter_count: default_chapter_count(),
            unattended: false,
            retry: RetryPolicy::default(),
            gemini: GeminiConfig::default(),
            audio: AudioConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.backends.is_empty() {
            anyhow::bail!("audio.backends must list at least one speech model");
        }
        if self.chapter_count == 0 {
            anyhow::bail!("chapter_count must be at least 1");
        }
        for policy in [&self.retry, &self.audio.fast_fail] {
            let m = policy.backoff_multiplier;
            if !m.is_finite() || m < 1.0 {
                anyhow::bail!("backoff_multiplier must be a finite number >= 1.0, got {}", m);
            }
        }
        Ok(())
    }

    /// API key from the config file, falling back to the environment.
    pub fn api_key(&self) -> Result<String> {
        if let Some(key) = self.gemini.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .context("Gemini API key missing: set gemini.api_key in config.yml or GEMINI_API_KEY")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() -> Result<()> {
        let config: Config = serde_yaml_ng::from_str("gemini:\n  api_key: abc\n")?;
        assert_eq!(config.language, "zh");
        assert_eq!(config.chapter_count, 8);
        assert!(!config.unattended);
        assert_eq!(config.audio.voice, None);
        assert_eq!(config.audio.voice(), Voice::Kore);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay_ms, 2000);
        assert_eq!(config.audio.fast_fail, RetryPolicy::fast_fail());
        assert_eq!(config.audio.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.audio.sample_rate, 24_000);
        assert_eq!(config.audio.backends.len(), 2);
        assert_eq!(config.api_key()?, "abc");
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("config.yml");

        let mut config = Config::default();
        config.audio.voice = Some(Voice::Charon);
        config.audio.backends = vec!["tts-a".to_string()];
        config.save(&path)?;

        let loaded = Config::load(&path)?;
        assert_eq!(loaded.audio.voice, Some(Voice::Charon));
        assert_eq!(loaded.audio.backends, vec!["tts-a".to_string()]);
        Ok(())
    }

    #[test]
    fn test_missing_file_and_empty_backends_rejected() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        assert!(Config::load(&temp_dir.path().join("nope.yml")).is_err());

        let path = temp_dir.path().join("config.yml");
        fs::write(&path, "audio:\n  backends: []\n")?;
        assert!(Config::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_non_finite_backoff_multiplier_rejected() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("config.yml");

        for value in [".nan", ".inf", "0.5"] {
            fs::write(&path, format!("retry:\n  backoff_multiplier: {}\n", value))?;
            assert!(Config::load(&path).is_err(), "accepted {}", value);

            let yaml = format!("audio:\n  fast_fail:\n    backoff_multiplier: {}\n", value);
            fs::write(&path, yaml)?;
            assert!(Config::load(&path).is_err(), "accepted fast_fail {}", value);
        }

        fs::write(&path, "retry:\n  backoff_multiplier: 1.0e308\n")?;
        assert_eq!(Config::load(&path)?.retry.backoff_multiplier, 1.0e308);
        Ok(())
    }
}
