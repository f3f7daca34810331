use thiserror::Error;

/// Normalized failure raised by a generation backend.
///
/// Providers report errors in several shapes (HTTP status, an error code nested
/// inside a JSON body, or only free text). Everything is flattened into this
/// record so the retry rules can be evaluated uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub status_code: Option<u16>,
    pub nested_code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            nested_code: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_nested_code(mut self, code: i64) -> Self {
        self.nested_code = Some(code);
        self
    }

    /// Wraps an arbitrary error (transport, JSON, ...) keeping only its text.
    pub fn from_display(err: impl std::fmt::Display) -> Self {
        Self::new(err.to_string())
    }
}

/// Pipeline stage a chapter failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Script,
    Image,
    Audio,
    Unknown,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::Script => "SCRIPT_ERROR",
            FailureKind::Image => "IMAGE_ERROR",
            FailureKind::Audio => "AUDIO_ERROR",
            FailureKind::Unknown => "UNKNOWN",
        }
    }

    /// User-facing message. `lang` is the configured language prefix; anything
    /// other than Chinese gets the English table.
    pub fn message(&self, lang: &str) -> &'static str {
        if lang.starts_with("zh") {
            match self {
                FailureKind::Script => "劇本生成失敗，AI 暫時無法為這個章節撰寫旁白。",
                FailureKind::Image => "場景圖片生成失敗。",
                FailureKind::Audio => "旁白語音合成失敗，所有語音模型皆無法使用。",
                FailureKind::Unknown => "生成章節內容時發生未知錯誤。",
            }
        } else {
            match self {
                FailureKind::Script => "Failed to write the narration script for this chapter.",
                FailureKind::Image => "Failed to generate a scene image.",
                FailureKind::Audio => "Narration audio could not be synthesized by any voice model.",
                FailureKind::Unknown => "An unexpected error occurred while generating this chapter.",
            }
        }
    }

    pub fn suggestion(&self, lang: &str) -> &'static str {
        if lang.starts_with("zh") {
            match self {
                FailureKind::Script => "請稍候片刻再重試，或換一個較具體的主題。",
                FailureKind::Image => "圖片服務可能已達使用上限，請稍後重試此章節。",
                FailureKind::Audio => "語音服務可能繁忙，請稍後重試或更換旁白聲音。",
                FailureKind::Unknown => "請重試此章節；若問題持續，請重新開始。",
            }
        } else {
            match self {
                FailureKind::Script => "Wait a moment and retry, or try a more specific topic.",
                FailureKind::Image => "The image service may be over quota. Retry this chapter later.",
                FailureKind::Audio => "The speech service may be busy. Retry later or pick another narrator voice.",
                FailureKind::Unknown => "Retry this chapter. If it keeps failing, start over.",
            }
        }
    }
}

/// Stage-tagged failure of a chapter pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("script generation failed: {0}")]
    Script(#[source] ProviderError),

    #[error("image generation failed for scene {scene}: {source}")]
    Image {
        scene: usize,
        #[source]
        source: ProviderError,
    },

    #[error("audio synthesis failed for scene {scene}: {source}")]
    Audio {
        scene: usize,
        #[source]
        source: ProviderError,
    },

    #[error("{0}")]
    Unknown(String),
}

impl GenerationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::Script(_) => FailureKind::Script,
            GenerationError::Image { .. } => FailureKind::Image,
            GenerationError::Audio { .. } => FailureKind::Audio,
            GenerationError::Unknown(_) => FailureKind::Unknown,
        }
    }
}
