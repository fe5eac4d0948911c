//! Advisory notifications for the presentation layer
//!
//! Fire-and-forget: emitting never blocks and nothing in the core waits on
//! a subscriber. A lagging or absent subscriber only loses notifications.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Named platform-level signals, surfaced to the user as toasts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Notification {
    /// A provider was skipped because its credentials are not configured
    CredentialsMissing { provider: String },
    /// The map SDK could not be loaded
    MapLoadFailed { detail: String },
    /// A search-type capability call failed at a provider
    SearchFailed { capability: String, detail: String },
    /// A geolocation provider failed
    GeolocationFailed { detail: String },
    /// Narration fell back to local speech
    LocalSpeechFallback { item: String },
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Notification::CredentialsMissing { .. } => "credentials-missing",
            Notification::MapLoadFailed { .. } => "map-load-failed",
            Notification::SearchFailed { .. } => "search-failed",
            Notification::GeolocationFailed { .. } => "geolocation-failed",
            Notification::LocalSpeechFallback { .. } => "local-speech-fallback",
        }
    }
}

/// Cloneable emitter handle
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn emit(&self, notification: Notification) {
        debug!(event = notification.name(), "notification_emitted");
        // Err only means nobody is listening
        let _ = self.tx.send(notification);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscriber() {
        let notifier = Notifier::default();
        notifier.emit(Notification::MapLoadFailed { detail: "x".to_string() });
    }

    #[tokio::test]
    async fn test_subscriber_receives() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();
        notifier.emit(Notification::CredentialsMissing { provider: "map".to_string() });

        let got = rx.recv().await.unwrap();
        assert_eq!(got.name(), "credentials-missing");
        let json = serde_json::to_value(&got).unwrap();
        assert_eq!(json["event"], "credentials-missing");
        assert_eq!(json["provider"], "map");
    }
}
