use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChapterStatus {
    #[default]
    Pending,
    Generating,
    Ready,
    Error,
}

/// Outline entry as returned by the provider, before it becomes a `Chapter`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChapterStub {
    pub title: String,
    pub description: String,
}

/// Narration text and image prompt for one scene, produced by the script stage.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SceneScript {
    pub script: String,
    pub image_prompt: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub script: String,
    pub image_prompt: String,
    pub image_url: String,
    pub audio_url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChapterContent {
    pub scenes: Vec<Scene>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: ChapterStatus,
    #[serde(default)]
    pub content: Option<ChapterContent>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_suggestion: Option<String>,
}

impl Chapter {
    pub fn from_stub(stub: ChapterStub) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: stub.title,
            description: stub.description,
            status: ChapterStatus::Pending,
            content: None,
            error_message: None,
            error_suggestion: None,
        }
    }

    pub fn scene_count(&self) -> usize {
        self.content.as_ref().map_or(0, |c| c.scenes.len())
    }
}

/// Prebuilt narration voices offered by the speech models.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Voice {
    #[default]
    Kore,
    Puck,
    Charon,
    Fenrir,
}

impl Voice {
    pub const ALL: [Voice; 4] = [Voice::Kore, Voice::Puck, Voice::Charon, Voice::Fenrir];

    pub fn name(&self) -> &'static str {
        match self {
            Voice::Kore => "Kore",
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Fenrir => "Fenrir",
        }
    }

    pub fn preview_phrase(&self, lang: &str) -> &'static str {
        if lang.starts_with("zh") {
            match self {
                Voice::Kore => "你好，我是 Kore，讓我帶你探索這個世界。",
                Voice::Puck => "嗨！我是 Puck，準備好來一場冒險了嗎？",
                Voice::Charon => "我是 Charon，歷史的故事將由我娓娓道來。",
                Voice::Fenrir => "我是 Fenrir，讓我們一起揭開真相。",
            }
        } else {
            match self {
                Voice::Kore => "Hello, I'm Kore. Let me guide you through this world.",
                Voice::Puck => "Hi! I'm Puck. Ready for an adventure?",
                Voice::Charon => "I am Charon, and these stories of history are mine to tell.",
                Voice::Fenrir => "I'm Fenrir. Let's uncover the truth together.",
            }
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Voice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Voice::ALL
            .iter()
            .copied()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("Unknown voice: {}", s))
    }
}
