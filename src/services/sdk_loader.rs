//! One-time, single-flight map SDK load
//!
//! The first successful load is cached for the lifetime of the loader and
//! shared by every caller. Concurrent callers wait on the in-flight load
//! instead of starting their own. A failed load is not cached; the next
//! caller tries again.

use crate::infra::credentials::MapCredentials;
use crate::infra::notify::{Notification, Notifier};
use crate::services::providers::{MapProvider, MapSdk, ProviderError};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

pub struct MapSdkLoader {
    sdk: Arc<dyn MapSdk>,
    loaded: OnceCell<Arc<dyn MapProvider>>,
    notifier: Notifier,
}

impl MapSdkLoader {
    pub fn new(sdk: Arc<dyn MapSdk>, notifier: Notifier) -> Self {
        Self { sdk, loaded: OnceCell::new(), notifier }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Loaded provider, loading it on first use.
    ///
    /// The provider is bound to the credentials of the first successful load.
    pub async fn get(
        &self,
        credentials: &MapCredentials,
    ) -> Result<Arc<dyn MapProvider>, ProviderError> {
        let result = self
            .loaded
            .get_or_try_init(|| async {
                info!("map_sdk_loading");
                self.sdk.load(credentials).await
            })
            .await;

        match result {
            Ok(provider) => Ok(Arc::clone(provider)),
            Err(e) => {
                error!(error = %e, "map_sdk_load_failed");
                self.notifier.emit(Notification::MapLoadFailed { detail: e.to_string() });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Coordinates, Datum};
    use crate::services::providers::{NearbyQuery, Poi, ReverseGeocode};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NullMap;

    #[async_trait]
    impl MapProvider for NullMap {
        async fn nearby(&self, _: &NearbyQuery) -> Result<Vec<Poi>, ProviderError> {
            Ok(Vec::new())
        }
        async fn keyword_search(&self, _: &str, _: u32) -> Result<Vec<Poi>, ProviderError> {
            Ok(Vec::new())
        }
        async fn reverse_geocode(&self, _: Coordinates) -> Result<ReverseGeocode, ProviderError> {
            Ok(ReverseGeocode::default())
        }
        async fn convert(&self, at: Coordinates, _: Datum) -> Result<Coordinates, ProviderError> {
            Ok(at)
        }
        async fn locate(&self) -> Result<Coordinates, ProviderError> {
            Err(ProviderError::Empty)
        }
    }

    /// Slow SDK that fails its first `fail_first` loads
    struct CountingSdk {
        loads: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl MapSdk for CountingSdk {
        async fn load(&self, _: &MapCredentials) -> Result<Arc<dyn MapProvider>, ProviderError> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n < self.fail_first {
                return Err(ProviderError::SdkUnavailable("script blocked".to_string()));
            }
            Ok(Arc::new(NullMap))
        }
    }

    fn creds() -> MapCredentials {
        MapCredentials { key: "k".to_string(), secret: "s".to_string() }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let sdk = Arc::new(CountingSdk { loads: AtomicUsize::new(0), fail_first: 0 });
        let loader = Arc::new(MapSdkLoader::new(sdk.clone(), Notifier::default()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let loader = Arc::clone(&loader);
            handles.push(tokio::spawn(async move { loader.get(&creds()).await.is_ok() }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }

        assert_eq!(sdk.loads.load(Ordering::SeqCst), 1);
        assert!(loader.is_loaded());

        loader.get(&creds()).await.unwrap();
        assert_eq!(sdk.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_and_notified() {
        let sdk = Arc::new(CountingSdk { loads: AtomicUsize::new(0), fail_first: 1 });
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();
        let loader = MapSdkLoader::new(sdk.clone(), notifier);

        assert!(matches!(loader.get(&creds()).await, Err(ProviderError::SdkUnavailable(_))));
        assert!(!loader.is_loaded());
        assert_eq!(rx.recv().await.unwrap().name(), "map-load-failed");

        assert!(loader.get(&creds()).await.is_ok());
        assert_eq!(sdk.loads.load(Ordering::SeqCst), 2);
    }
}
