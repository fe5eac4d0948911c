//! Services - capability resolution and playback state
//!
//! This module contains the core services:
//! - `providers` - Provider traits and the shared provider error
//! - `sdk_loader` - One-time, single-flight map SDK load
//! - `orchestrator` - Fallback chains for every capability
//! - `audio` - Single-flight narration playback
//! - `geolocation` - Location fallback chain and place naming
//! - `history` - Bounded narration history

pub mod audio;
pub mod geolocation;
pub mod history;
pub mod orchestrator;
pub mod providers;
pub mod sdk_loader;

// Re-export commonly used types
pub use audio::{AudioUnlock, NarrationController, NarrationSource, SpeechEngine, SpeechError};
pub use geolocation::{
    DeviceLocation, GeolocationResolver, LocatedLandmarks, LocationFix, LocationProvider,
    LocationSource, MapLocationProvider, ResolvedLocation,
};
pub use history::{HistoryLog, HISTORY_KEY};
pub use orchestrator::GuideService;
pub use providers::{
    ChatProvider, GenerateRequest, GenerateResponse, MapProvider, MapSdk, MultimodalProvider,
    NearbyQuery, Poi, ProviderError, ReverseGeocode,
};
pub use sdk_loader::MapSdkLoader;
