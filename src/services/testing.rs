//! Scripted provider shared by the service tests.

use crate::core::error::ProviderError;
use crate::core::state::{ChapterStub, SceneScript, Voice};
use crate::services::provider::{GenerationProvider, SpeechOutput};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Outline(String),
    Scripts { topic: String, chapter: String },
    Image(String),
    Audio { model: String, script: String, voice: Voice },
}

enum AudioBehavior {
    Fail(ProviderError),
    Text(String),
}

type ImageHook = Arc<dyn Fn(&str) + Send + Sync>;

pub struct ScriptedProvider {
    calls: Mutex<Vec<Call>>,
    outline: Mutex<Result<Vec<ChapterStub>, ProviderError>>,
    script_error: Mutex<Option<ProviderError>>,
    script_count: Mutex<usize>,
    image_errors: Mutex<HashMap<String, ProviderError>>,
    audio: Mutex<HashMap<String, AudioBehavior>>,
    on_image: Mutex<Option<ImageHook>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            outline: Mutex::new(Ok(stubs(8))),
            script_error: Mutex::new(None),
            script_count: Mutex::new(3),
            image_errors: Mutex::new(HashMap::new()),
            audio: Mutex::new(HashMap::new()),
            on_image: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn script_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Scripts { .. }))
    }

    pub fn set_outline(&self, outline: Result<Vec<ChapterStub>, ProviderError>) {
        *self.outline.lock().unwrap() = outline;
    }

    pub fn fail_scripts(&self, err: Option<ProviderError>) {
        *self.script_error.lock().unwrap() = err;
    }

    pub fn set_script_count(&self, n: usize) {
        *self.script_count.lock().unwrap() = n;
    }

    pub fn fail_image(&self, prompt: &str, err: ProviderError) {
        self.image_errors.lock().unwrap().insert(prompt.to_string(), err);
    }

    pub fn fail_audio(&self, model: &str, err: ProviderError) {
        self.audio
            .lock()
            .unwrap()
            .insert(model.to_string(), AudioBehavior::Fail(err));
    }

    pub fn answer_audio_with_text(&self, model: &str, text: &str) {
        self.audio
            .lock()
            .unwrap()
            .insert(model.to_string(), AudioBehavior::Text(text.to_string()));
    }

    pub fn on_image(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_image.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn clear_image_hook(&self) {
        *self.on_image.lock().unwrap() = None;
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn stubs(n: usize) -> Vec<ChapterStub> {
    (1..=n)
        .map(|i| ChapterStub {
            title: format!("Chapter {}", i),
            description: format!("Part {} of the story", i),
        })
        .collect()
}

/// Image prompt the scripted provider emits for `scene` (0-based) of `chapter`.
pub fn image_prompt(chapter: &str, scene: usize) -> String {
    format!("{} image {}", chapter, scene)
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate_outline(&self, topic: &str) -> Result<Vec<ChapterStub>, ProviderError> {
        self.record(Call::Outline(topic.to_string()));
        self.outline.lock().unwrap().clone()
    }

    async fn generate_scene_scripts(
        &self,
        topic: &str,
        chapter_title: &str,
    ) -> Result<Vec<SceneScript>, ProviderError> {
        self.record(Call::Scripts {
            topic: topic.to_string(),
            chapter: chapter_title.to_string(),
        });
        if let Some(err) = self.script_error.lock().unwrap().clone() {
            return Err(err);
        }
        let n = *self.script_count.lock().unwrap();
        Ok((0..n)
            .map(|i| SceneScript {
                script: format!("{} narration {}", chapter_title, i),
                image_prompt: image_prompt(chapter_title, i),
            })
            .collect())
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError> {
        self.record(Call::Image(prompt.to_string()));
        // Called without the lock held; hooks may panic or call back in.
        let hook = self.on_image.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(prompt);
        }
        if let Some(err) = self.image_errors.lock().unwrap().get(prompt) {
            return Err(err.clone());
        }
        Ok(format!("data:image/png;base64,{}", prompt.len()))
    }

    async fn generate_audio(
        &self,
        model: &str,
        script: &str,
        voice: Voice,
    ) -> Result<SpeechOutput, ProviderError> {
        self.record(Call::Audio {
            model: model.to_string(),
            script: script.to_string(),
            voice,
        });
        match self.audio.lock().unwrap().get(model) {
            Some(AudioBehavior::Fail(err)) => Err(err.clone()),
            Some(AudioBehavior::Text(text)) => Ok(SpeechOutput::Text(text.clone())),
            None => Ok(SpeechOutput::Pcm(vec![0u8; 4_800])),
        }
    }
}
