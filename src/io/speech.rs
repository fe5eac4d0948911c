//! Headless speech output
//!
//! `TranscriptSpeech` "speaks" by logging the utterance and keeping it in a
//! transcript. An utterance lasts a simulated time proportional to its
//! length, so completion polling behaves as it would with a real engine.

use crate::services::audio::{AudioUnlock, SpeechEngine, SpeechError};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

struct Utterance {
    started: Instant,
    length: Duration,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl Utterance {
    fn elapsed(&self, now: Instant) -> Duration {
        let paused_now = self.paused_at.map(|p| now.duration_since(p)).unwrap_or_default();
        now.duration_since(self.started).saturating_sub(self.paused_total + paused_now)
    }
}

pub struct TranscriptSpeech {
    per_char: Duration,
    transcript: Mutex<Vec<String>>,
    current: Mutex<Option<Utterance>>,
}

impl TranscriptSpeech {
    /// `per_char` is the simulated speaking time per character
    pub fn new(per_char: Duration) -> Self {
        Self { per_char, transcript: Mutex::new(Vec::new()), current: Mutex::new(None) }
    }

    /// Audible utterances so far
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().clone()
    }
}

impl SpeechEngine for TranscriptSpeech {
    fn speak(&self, text: &str, language: &str, volume: f32) -> Result<(), SpeechError> {
        if text.is_empty() {
            return Err(SpeechError::Rejected("empty utterance".to_string()));
        }
        if volume <= 0.0 {
            debug!("speech_silent_utterance");
            return Ok(());
        }

        let chars = text.chars().count() as u32;
        info!(language = %language, chars, text = %text, "speech_utterance");
        self.transcript.lock().push(text.to_string());
        *self.current.lock() = Some(Utterance {
            started: Instant::now(),
            length: self.per_char * chars,
            paused_at: None,
            paused_total: Duration::ZERO,
        });
        Ok(())
    }

    fn cancel(&self) {
        self.current.lock().take();
    }

    fn pause(&self) {
        if let Some(u) = self.current.lock().as_mut() {
            if u.paused_at.is_none() {
                u.paused_at = Some(Instant::now());
            }
        }
    }

    fn resume(&self) {
        if let Some(u) = self.current.lock().as_mut() {
            if let Some(p) = u.paused_at.take() {
                u.paused_total += p.elapsed();
            }
        }
    }

    fn is_speaking(&self) -> bool {
        self.current.lock().as_ref().is_some_and(|u| u.elapsed(Instant::now()) < u.length)
    }

    fn is_paused(&self) -> bool {
        self.current.lock().as_ref().is_some_and(|u| u.paused_at.is_some())
    }
}

/// Audio output that needs no unlocking
pub struct NoopUnlock;

impl AudioUnlock for NoopUnlock {
    fn unlock_now(&self) {
        debug!("audio_unlock_noop");
    }
}
