//! Domain models - landmark data and fallback content
//!
//! This module contains the canonical data types used throughout the system:
//! - `types` - Coordinates, Landmark, SubAttraction, AudioState, HistoryItem
//! - `mock` - static data used when every provider fails

pub mod mock;
pub mod types;

// Re-export commonly used types at module level
pub use types::{
    AudioState, Capability, Coordinates, Datum, HistoryItem, Identification, ImageInput, Landmark,
    PlaceMatch, ProviderKind, SubAttraction,
};
