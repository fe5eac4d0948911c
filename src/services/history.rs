//! Narration history
//!
//! Newest first, one entry per landmark name, bounded. The whole list is
//! written back to the key-value store as JSON after every change.

use crate::domain::types::{HistoryItem, Landmark};
use crate::infra::credentials::KeyValueStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const HISTORY_KEY: &str = "travel_history";

pub struct HistoryLog {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    items: Mutex<Vec<HistoryItem>>,
}

impl HistoryLog {
    /// Load the persisted list; an unreadable entry starts an empty history
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut items: Vec<HistoryItem> = match store.get(HISTORY_KEY) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "history_unreadable_starting_empty");
                Vec::new()
            }),
            None => Vec::new(),
        };
        items.truncate(capacity);
        debug!(entries = items.len(), "history_loaded");
        Self { store, capacity, items: Mutex::new(items) }
    }

    pub fn items(&self) -> Vec<HistoryItem> {
        self.items.lock().clone()
    }

    /// Record a completed narration, stamped now
    pub fn record(&self, landmark: &Landmark, full_text: &str) -> HistoryItem {
        let item = HistoryItem {
            landmark: landmark.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            full_text: Some(full_text.to_string()),
        };
        self.insert(item.clone());
        item
    }

    /// Put `item` at the front, replacing any entry with the same name
    pub fn insert(&self, item: HistoryItem) {
        let mut items = self.items.lock();
        items.retain(|h| h.landmark.name != item.landmark.name);
        items.insert(0, item);
        items.truncate(self.capacity);
        self.persist(&items);
    }

    pub fn clear(&self) {
        let mut items = self.items.lock();
        items.clear();
        self.persist(&items);
    }

    fn persist(&self, items: &[HistoryItem]) {
        match serde_json::to_string(items) {
            Ok(json) => self.store.set(HISTORY_KEY, &json),
            Err(e) => error!(error = %e, "history_serialize_failed"),
        }
    }
}
