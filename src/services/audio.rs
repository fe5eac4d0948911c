//! Narration playback controller
//!
//! All speech goes through one [`NarrationController`], so at most one
//! narration is ever active. State is keyed by the narrated item's name:
//! - a new name stops whatever is active, loads narration, then plays it
//! - the active name toggles between playing and paused
//! - a narration response that arrives after a newer request (or a stop)
//!   is dropped
//!
//! Completion is detected by polling the speech engine, because engines do
//! not report the end of an utterance reliably.

use crate::domain::mock;
use crate::domain::types::{AudioState, Identification, Landmark};
use crate::infra::config::Config;
use crate::infra::notify::{Notification, Notifier};
use crate::services::history::HistoryLog;
use crate::services::providers::ProviderError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Zero-width space spoken at zero volume to obtain playback permission
const PRIMER_UTTERANCE: &str = "\u{200B}";

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech synthesis unavailable")]
    Unavailable,
    #[error("utterance rejected: {0}")]
    Rejected(String),
}

/// Platform speech synthesis. Calls are synchronous and must not block.
pub trait SpeechEngine: Send + Sync {
    fn speak(&self, text: &str, language: &str, volume: f32) -> Result<(), SpeechError>;
    fn cancel(&self);
    fn pause(&self);
    fn resume(&self);
    fn is_speaking(&self) -> bool;
    fn is_paused(&self) -> bool;
}

/// Platform audio output that must be unlocked inside a user gesture
pub trait AudioUnlock: Send + Sync {
    fn unlock_now(&self);
}

/// Where narration text comes from
#[async_trait]
pub trait NarrationSource: Send + Sync {
    /// False when no remote provider could possibly answer
    fn has_remote_credentials(&self) -> bool;

    async fn narrate(&self, landmark_name: &str) -> Result<String, ProviderError>;
}

struct Inner {
    state: AudioState,
    /// Bumped on every stop and every new request; stale responses compare unequal
    generation: u64,
}

pub struct NarrationController {
    engine: Arc<dyn SpeechEngine>,
    unlock: Arc<dyn AudioUnlock>,
    source: Arc<dyn NarrationSource>,
    history: Arc<HistoryLog>,
    notifier: Notifier,
    language: String,
    poll_interval: Duration,
    inner: Mutex<Inner>,
}

impl NarrationController {
    pub fn new(
        config: &Config,
        engine: Arc<dyn SpeechEngine>,
        unlock: Arc<dyn AudioUnlock>,
        source: Arc<dyn NarrationSource>,
        history: Arc<HistoryLog>,
        notifier: Notifier,
    ) -> Self {
        Self {
            engine,
            unlock,
            source,
            history,
            notifier,
            language: config.language().to_string(),
            poll_interval: config.poll_interval(),
            inner: Mutex::new(Inner { state: AudioState::idle(), generation: 0 }),
        }
    }

    pub fn state(&self) -> AudioState {
        self.inner.lock().state.clone()
    }

    /// Obtain playback permission. Call synchronously from the user gesture,
    /// before awaiting anything.
    pub fn prime(&self) {
        self.unlock.unlock_now();
        if self.engine.speak(PRIMER_UTTERANCE, &self.language, 0.0).is_ok() {
            self.engine.cancel();
        }
        debug!("audio_primed");
    }

    /// Play, pause or resume narration for `name`.
    ///
    /// Everything up to the narration request runs synchronously, so the
    /// permission priming happens inside the caller's gesture.
    pub async fn play(&self, name: &str, landmark: Option<&Landmark>) -> AudioState {
        let generation = {
            let mut inner = self.inner.lock();

            if inner.state.is_active_for(name) {
                if inner.state.is_playing {
                    self.engine.pause();
                    inner.state.is_playing = false;
                    inner.state.is_paused = true;
                    info!(name = %name, "narration_paused");
                } else if inner.state.is_paused {
                    self.engine.resume();
                    inner.state.is_playing = true;
                    inner.state.is_paused = false;
                    info!(name = %name, "narration_resumed");
                }
                return inner.state.clone();
            }

            self.prime();
            self.stop_locked(&mut inner);

            if !self.source.has_remote_credentials() {
                let text = landmark
                    .map(|l| l.description.as_str())
                    .filter(|d| !d.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| mock::local_placeholder(name));
                self.speak_locally(&mut inner, name, &text);
                return inner.state.clone();
            }

            inner.state = AudioState::loading(name);
            info!(name = %name, "narration_loading");
            inner.generation
        };

        let result = self.source.narrate(name).await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!(name = %name, "narration_superseded");
            return inner.state.clone();
        }

        match result {
            Ok(text) => {
                if let Some(landmark) = landmark {
                    self.history.record(landmark, &text);
                }
                match self.engine.speak(&text, &self.language, 1.0) {
                    Ok(()) => {
                        inner.state = AudioState::playing(name, &text);
                        info!(name = %name, chars = text.chars().count(), "narration_started");
                    }
                    Err(e) => {
                        warn!(name = %name, error = %e, "narration_speak_failed");
                        inner.state = AudioState::idle();
                    }
                }
            }
            Err(e) => {
                warn!(name = %name, error = %e, "narration_request_failed");
                let text = landmark
                    .map(|l| l.description.as_str())
                    .filter(|d| !d.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("为您播放 {} 的简短介绍", name));
                self.speak_locally(&mut inner, name, &text);
            }
        }
        inner.state.clone()
    }

    /// Play an identification result: record it and speak its script
    pub fn present_identification(&self, identification: &Identification) -> AudioState {
        let name = identification.landmark.name.as_str();
        self.history.record(&identification.landmark, &identification.script);

        let mut inner = self.inner.lock();
        self.stop_locked(&mut inner);
        match self.engine.speak(&identification.script, &self.language, 1.0) {
            Ok(()) => {
                inner.state = AudioState::playing(name, &identification.script);
                info!(name = %name, "identification_narration_started");
            }
            Err(e) => warn!(name = %name, error = %e, "narration_speak_failed"),
        }
        inner.state.clone()
    }

    pub fn pause(&self) -> AudioState {
        let mut inner = self.inner.lock();
        if inner.state.is_playing {
            self.engine.pause();
            inner.state.is_playing = false;
            inner.state.is_paused = true;
        }
        inner.state.clone()
    }

    pub fn resume(&self) -> AudioState {
        let mut inner = self.inner.lock();
        if inner.state.is_paused {
            self.engine.resume();
            inner.state.is_playing = true;
            inner.state.is_paused = false;
        }
        inner.state.clone()
    }

    pub fn stop(&self) -> AudioState {
        let mut inner = self.inner.lock();
        self.stop_locked(&mut inner);
        inner.state.clone()
    }

    fn stop_locked(&self, inner: &mut Inner) {
        self.engine.cancel();
        inner.generation += 1;
        if let Some(name) = inner.state.playing_item_name.take() {
            info!(name = %name, "narration_stopped");
        }
        inner.state = AudioState::idle();
    }

    /// Speak without a remote narration; idle if even that is impossible
    fn speak_locally(&self, inner: &mut Inner, name: &str, text: &str) {
        match self.engine.speak(text, &self.language, 1.0) {
            Ok(()) => {
                inner.state = AudioState::playing(name, text);
                info!(name = %name, "narration_local_fallback");
                self.notifier.emit(Notification::LocalSpeechFallback { item: name.to_string() });
            }
            Err(e) => {
                warn!(name = %name, error = %e, "local_speech_unavailable");
                inner.state = AudioState::idle();
            }
        }
    }

    /// One completion check: a playing narration whose engine has gone quiet
    /// returns to idle. Returns true when that happened.
    pub fn poll_completion(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_playing && !self.engine.is_speaking() && !self.engine.is_paused() {
            if let Some(name) = inner.state.playing_item_name.as_deref() {
                info!(name = %name, "narration_finished");
            }
            inner.state = AudioState::idle();
            return true;
        }
        false
    }

    /// Poll for completion every `poll_interval` until the controller is dropped
    pub fn spawn_completion_watch(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.poll_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.poll_completion();
            }
        })
    }
}
