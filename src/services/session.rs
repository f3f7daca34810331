use crate::core::config::Config;
use crate::core::error::{GenerationError, ProviderError};
use crate::core::state::{Chapter, ChapterContent, ChapterStatus, Voice};
use crate::services::provider::GenerationProvider;
use crate::services::workflow::{ChapterOrchestrator, VoiceSource};
use futures_util::FutureExt;
use log::{error, info, warn};
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owner of the ordered chapter sequence for one documentary.
///
/// The sequence lives in a watch channel and is only ever replaced as a whole
/// by the closures passed to `send_if_modified`, which run one at a time.
/// Readers therefore see either the old or the new chapter, never a half
/// written one.
pub struct Session {
    config: Config,
    provider: Arc<dyn GenerationProvider>,
    orchestrator: ChapterOrchestrator,
    chapters: watch::Sender<Vec<Chapter>>,
    topic: RwLock<Option<String>>,
    voice: RwLock<Voice>,
    last_error: RwLock<Option<String>>,
}

impl VoiceSource for Session {
    fn current_voice(&self) -> Voice {
        *self.voice.read()
    }
}

impl Session {
    pub fn new(config: Config, provider: Arc<dyn GenerationProvider>) -> Arc<Self> {
        let orchestrator = ChapterOrchestrator::from_config(provider.clone(), &config);
        let (chapters, _) = watch::channel(Vec::new());
        let voice = config.audio.voice();
        Arc::new(Self {
            config,
            provider,
            orchestrator,
            chapters,
            topic: RwLock::new(None),
            voice: RwLock::new(voice),
            last_error: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chapters(&self) -> Vec<Chapter> {
        self.chapters.borrow().clone()
    }

    pub fn chapter(&self, id: &str) -> Option<Chapter> {
        self.chapters.borrow().iter().find(|c| c.id == id).cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Chapter>> {
        self.chapters.subscribe()
    }

    pub fn topic(&self) -> Option<String> {
        self.topic.read().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Takes effect for every scene whose audio has not been synthesized yet,
    /// including scenes of chapters already generating.
    pub fn set_voice(&self, voice: Voice) {
        info!("Narration voice set to {}", voice);
        *self.voice.write() = voice;
    }

    /// Turns `topic` into pending chapters and starts generating the first.
    ///
    /// On failure the existing topic and chapters are left untouched and a
    /// single user-facing message is recorded in `last_error`.
    pub async fn start(
        self: &Arc<Self>,
        topic: &str,
    ) -> Result<Option<JoinHandle<()>>, ProviderError> {
        let provider = self.provider.as_ref();
        let outline = self
            .config
            .retry
            .execute(move || provider.generate_outline(topic))
            .await
            .and_then(|stubs| {
                if stubs.is_empty() {
                    Err(ProviderError::new("outline contained no chapters"))
                } else {
                    Ok(stubs)
                }
            });

        let stubs = match outline {
            Ok(stubs) => stubs,
            Err(e) => {
                error!("Outline generation failed for {:?}: {}", topic, e);
                let message = outline_failure_message(&self.config.language);
                *self.last_error.write() = Some(message.to_string());
                return Err(e);
            }
        };

        let chapters: Vec<Chapter> = stubs.into_iter().map(Chapter::from_stub).collect();
        info!("Outline for {:?}: {} chapters", topic, chapters.len());
        let first_id = chapters[0].id.clone();

        *self.topic.write() = Some(topic.to_string());
        *self.last_error.write() = None;
        self.chapters.send_replace(chapters);

        Ok(self.spawn_generation(&first_id))
    }

    /// Drops the current documentary so a new topic can be entered.
    pub fn reset(&self) {
        *self.topic.write() = None;
        *self.last_error.write() = None;
        self.chapters.send_replace(Vec::new());
    }

    /// Runs the chapter pipeline on the current task. Returns false when the
    /// chapter is unknown, already ready, or already generating.
    pub async fn generate(&self, id: &str) -> bool {
        let Some(chapter) = self.begin_generation(id) else {
            return false;
        };
        let outcome = self.run_pipeline(&chapter).await;
        self.finish(&chapter.id, outcome);
        true
    }

    /// Detached variant of `generate`. The status flips to generating before
    /// this returns, so repeated calls for the same chapter spawn at most once.
    pub fn spawn_generation(self: &Arc<Self>, id: &str) -> Option<JoinHandle<()>> {
        let chapter = self.begin_generation(id)?;
        let session = Arc::clone(self);
        Some(tokio::spawn(async move {
            let outcome = session.run_pipeline(&chapter).await;
            session.finish(&chapter.id, outcome);
        }))
    }

    /// Explicit user retry of a failed chapter.
    pub fn retry(self: &Arc<Self>, id: &str) -> Option<JoinHandle<()>> {
        match self.chapter(id) {
            Some(c) if c.status == ChapterStatus::Error => self.spawn_generation(id),
            Some(c) => {
                warn!("Ignoring retry of chapter {:?} in state {:?}", c.title, c.status);
                None
            }
            None => None,
        }
    }

    /// Resolves once the chapter is ready or failed. `None` if it vanished.
    pub async fn wait_until_settled(&self, id: &str) -> Option<Chapter> {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|chapters| match chapters.iter().find(|c| c.id == id) {
                Some(c) => matches!(c.status, ChapterStatus::Ready | ChapterStatus::Error),
                None => true,
            })
            .await
            .ok()?;
        settled.iter().find(|c| c.id == id).cloned()
    }

    /// pending/error -> generating. Checked and written in one step, before
    /// anything awaits.
    fn begin_generation(&self, id: &str) -> Option<Chapter> {
        let mut started = None;
        self.chapters.send_if_modified(|chapters| {
            let Some(chapter) = chapters.iter_mut().find(|c| c.id == id) else {
                warn!("Generation requested for unknown chapter {}", id);
                return false;
            };
            match chapter.status {
                ChapterStatus::Pending | ChapterStatus::Error => {
                    chapter.status = ChapterStatus::Generating;
                    chapter.error_message = None;
                    chapter.error_suggestion = None;
                    started = Some(chapter.clone());
                    true
                }
                ChapterStatus::Generating | ChapterStatus::Ready => false,
            }
        });
        if let Some(chapter) = &started {
            info!("Chapter {:?}: generating", chapter.title);
        }
        started
    }

    /// A panic anywhere in the pipeline ends up as an unknown failure, so the
    /// chapter always leaves `Generating`.
    async fn run_pipeline(&self, chapter: &Chapter) -> Result<ChapterContent, GenerationError> {
        let topic = self
            .topic()
            .ok_or_else(|| GenerationError::Unknown("no topic has been set".to_string()))?;
        AssertUnwindSafe(self.orchestrator.generate(&topic, chapter, self))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(GenerationError::Unknown("chapter pipeline panicked".to_string()))
            })
    }

    /// generating -> ready/error. Dropped when the chapter is no longer
    /// generating, e.g. after a reset replaced the sequence.
    fn finish(&self, id: &str, outcome: Result<ChapterContent, GenerationError>) {
        let lang = self.config.language.as_str();
        let applied = self.chapters.send_if_modified(|chapters| {
            let Some(chapter) = chapters
                .iter_mut()
                .find(|c| c.id == id && c.status == ChapterStatus::Generating)
            else {
                return false;
            };
            match &outcome {
                Ok(content) => {
                    chapter.status = ChapterStatus::Ready;
                    chapter.content = Some(content.clone());
                    info!("Chapter {:?}: ready", chapter.title);
                }
                Err(e) => {
                    let kind = e.kind();
                    chapter.status = ChapterStatus::Error;
                    chapter.error_message = Some(kind.message(lang).to_string());
                    chapter.error_suggestion = Some(kind.suggestion(lang).to_string());
                    error!("Chapter {:?}: {} ({})", chapter.title, kind.code(), e);
                }
            }
            true
        });
        if !applied {
            warn!("Discarding result for chapter {} that is no longer generating", id);
        }
    }
}

pub fn outline_failure_message(lang: &str) -> &'static str {
    if lang.starts_with("zh") {
        "無法生成紀錄片大綱，請稍後再試或換一個主題。"
    } else {
        "Could not create the documentary outline. Try again later or pick another topic."
    }
}
