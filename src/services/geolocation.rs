//! Device location with fallbacks and a readable place name
//!
//! Order: map provider geolocation, then the device provider, then a fixed
//! demo coordinate. Whatever path produced the position, a nearby-landmark
//! scan follows.

use crate::domain::types::{Coordinates, Datum, Landmark, ProviderKind};
use crate::infra::notify::{Notification, Notifier};
use crate::services::orchestrator::GuideService;
use crate::services::providers::ProviderError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A position and the datum it is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocationFix {
    pub coords: Coordinates,
    pub datum: Datum,
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn locate(&self) -> Result<LocationFix, ProviderError>;
}

/// Geolocation through the loaded map provider (IP based, already GCJ-02)
pub struct MapLocationProvider {
    guide: Arc<GuideService>,
}

impl MapLocationProvider {
    pub fn new(guide: Arc<GuideService>) -> Self {
        Self { guide }
    }
}

#[async_trait]
impl LocationProvider for MapLocationProvider {
    fn name(&self) -> &'static str {
        "map"
    }

    async fn locate(&self) -> Result<LocationFix, ProviderError> {
        let map = self
            .guide
            .map_provider()
            .await
            .ok_or(ProviderError::CredentialMissing(ProviderKind::Map))?;
        let coords = map.locate().await?;
        Ok(LocationFix { coords, datum: Datum::Gcj02 })
    }
}

/// Device position supplied by the host (raw GPS), if it has one
pub struct DeviceLocation {
    fix: Option<LocationFix>,
}

impl DeviceLocation {
    pub fn new(coords: Option<Coordinates>) -> Self {
        Self { fix: coords.map(|coords| LocationFix { coords, datum: Datum::Wgs84 }) }
    }
}

#[async_trait]
impl LocationProvider for DeviceLocation {
    fn name(&self) -> &'static str {
        "device"
    }

    async fn locate(&self) -> Result<LocationFix, ProviderError> {
        self.fix.ok_or(ProviderError::Empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Primary,
    Secondary,
    Demo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub coords: Coordinates,
    pub datum: Datum,
    pub source: LocationSource,
    pub place_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocatedLandmarks {
    pub location: ResolvedLocation,
    pub landmarks: Vec<Landmark>,
}

pub struct GeolocationResolver {
    guide: Arc<GuideService>,
    primary: Arc<dyn LocationProvider>,
    secondary: Arc<dyn LocationProvider>,
    notifier: Notifier,
    demo_coords: Coordinates,
    demo_label: String,
}

impl GeolocationResolver {
    pub fn new(
        guide: Arc<GuideService>,
        primary: Arc<dyn LocationProvider>,
        secondary: Arc<dyn LocationProvider>,
    ) -> Self {
        let notifier = guide.notifier().clone();
        let demo_coords = guide.config().demo_coords();
        let demo_label = guide.config().demo_label().to_string();
        Self { guide, primary, secondary, notifier, demo_coords, demo_label }
    }

    /// Map geolocation first, `device` as the secondary provider
    pub fn with_device(guide: Arc<GuideService>, device: DeviceLocation) -> Self {
        let primary = Arc::new(MapLocationProvider::new(Arc::clone(&guide)));
        Self::new(guide, primary, Arc::new(device))
    }

    async fn try_provider(&self, provider: &dyn LocationProvider) -> Option<LocationFix> {
        match provider.locate().await {
            Ok(fix) => {
                info!(provider = provider.name(), location = %fix.coords, "location_fixed");
                Some(fix)
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "geolocation_failed");
                self.notifier.emit(Notification::GeolocationFailed {
                    detail: format!("{}: {}", provider.name(), e),
                });
                None
            }
        }
    }

    /// Resolve a position; never fails
    pub async fn locate(&self) -> ResolvedLocation {
        if let Some(fix) = self.try_provider(self.primary.as_ref()).await {
            let place_name = self.place_name(fix).await;
            return ResolvedLocation {
                coords: fix.coords,
                datum: fix.datum,
                source: LocationSource::Primary,
                place_name,
            };
        }

        if let Some(fix) = self.try_provider(self.secondary.as_ref()).await {
            let place_name = self.place_name(fix).await;
            return ResolvedLocation {
                coords: fix.coords,
                datum: fix.datum,
                source: LocationSource::Secondary,
                place_name,
            };
        }

        info!(location = %self.demo_coords, "location_demo_fallback");
        ResolvedLocation {
            coords: self.demo_coords,
            datum: Datum::Gcj02,
            source: LocationSource::Demo,
            place_name: self.demo_label.clone(),
        }
    }

    /// Readable name for a fix, or `"lat, lng"` when none can be resolved.
    ///
    /// Raw GPS fixes are converted to the map datum first; if conversion
    /// fails the raw position is geocoded directly.
    pub async fn place_name(&self, fix: LocationFix) -> String {
        let fallback = fix.coords.formatted();
        let Some(map) = self.guide.map_provider().await else {
            debug!("place_name_without_map");
            return fallback;
        };

        let target = if fix.datum == Datum::Wgs84 {
            match map.convert(fix.coords, fix.datum).await {
                Ok(converted) => converted,
                Err(e) => {
                    warn!(error = %e, "coordinate_convert_failed");
                    fix.coords
                }
            }
        } else {
            fix.coords
        };

        match map.reverse_geocode(target).await {
            Ok(regeo) => regeo.formatted_address.unwrap_or(fallback),
            Err(e) => {
                warn!(error = %e, "reverse_geocode_failed");
                fallback
            }
        }
    }

    /// Locate, then scan for nearby landmarks
    pub async fn refresh(&self) -> LocatedLandmarks {
        let location = self.locate().await;
        let landmarks = self.guide.nearby_landmarks(location.coords).await;
        LocatedLandmarks { location, landmarks }
    }
}
