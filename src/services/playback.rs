use crate::core::state::{Chapter, Scene};
use crate::services::session::Session;
use log::{debug, info};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackCursor {
    pub chapter_id: String,
    pub scene_index: usize,
}

/// What the player should do after an advance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Play this scene of the active chapter.
    Scene(usize),
    /// Moved to the next chapter, starting at scene 0.
    Chapter(String),
    /// The active chapter has no content yet.
    Waiting,
    Stopped,
}

/// Walks scenes in generation order and chapters in outline order.
/// Playback ends after the last scene of the last chapter.
pub struct PlaybackSequencer {
    session: Arc<Session>,
    cursor: Option<PlaybackCursor>,
    playing: bool,
}

impl PlaybackSequencer {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            cursor: None,
            playing: false,
        }
    }

    pub fn cursor(&self) -> Option<&PlaybackCursor> {
        self.cursor.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn active_chapter(&self) -> Option<Chapter> {
        self.cursor.as_ref().and_then(|c| self.session.chapter(&c.chapter_id))
    }

    pub fn active_scene(&self) -> Option<Scene> {
        let cursor = self.cursor.as_ref()?;
        let chapter = self.session.chapter(&cursor.chapter_id)?;
        chapter.content?.scenes.into_iter().nth(cursor.scene_index)
    }

    /// Makes `id` the active chapter at scene 0. A chapter without content is
    /// handed to the session for generation; selection never waits for it.
    /// Selecting the same chapter again is harmless.
    pub fn select(&mut self, id: &str) -> Option<JoinHandle<()>> {
        let chapter = self.session.chapter(id)?;

        self.cursor = Some(PlaybackCursor {
            chapter_id: chapter.id.clone(),
            scene_index: 0,
        });
        self.playing = true;
        info!("Now playing chapter {:?}", chapter.title);

        if chapter.content.is_none() {
            self.session.spawn_generation(&chapter.id)
        } else {
            None
        }
    }

    /// Called when the current scene's audio has finished.
    pub fn advance_scene(&mut self) -> Advance {
        if !self.playing {
            return Advance::Stopped;
        }
        let Some(chapter) = self.active_chapter() else {
            return self.stop();
        };
        let Some(content) = &chapter.content else {
            return Advance::Waiting;
        };
        let Some(cursor) = self.cursor.as_mut() else {
            return self.stop();
        };

        if cursor.scene_index + 1 < content.scenes.len() {
            cursor.scene_index += 1;
            debug!("[{}] advancing to scene {}", chapter.title, cursor.scene_index + 1);
            Advance::Scene(cursor.scene_index)
        } else {
            self.advance_chapter()
        }
    }

    /// Selects the chapter after the active one, or stops at the end.
    pub fn advance_chapter(&mut self) -> Advance {
        let Some(current) = self.cursor.as_ref().map(|c| c.chapter_id.clone()) else {
            return self.stop();
        };

        let chapters = self.session.chapters();
        let next = chapters
            .iter()
            .position(|c| c.id == current)
            .and_then(|i| chapters.get(i + 1));

        match next {
            Some(next) => {
                debug!("Chapter finished, moving to {:?}", next.title);
                // Generation for the next chapter, if any, runs detached.
                drop(self.select(&next.id));
                Advance::Chapter(next.id.clone())
            }
            None => {
                info!("Reached the end of the documentary");
                self.stop()
            }
        }
    }

    pub fn stop(&mut self) -> Advance {
        self.playing = false;
        Advance::Stopped
    }
}
