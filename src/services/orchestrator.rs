//! Fallback orchestration across map, domestic LLM, multimodal LLM and mock data
//!
//! Each capability walks a fixed provider order, one provider at a time, and
//! stops at the first result that passes the capability's usability check.
//! Providers without credentials are skipped without a call. Every public
//! capability resolves to a value; the last resort is static mock data.

use crate::domain::mock;
use crate::domain::types::{
    Capability, Coordinates, Identification, ImageInput, Landmark, PlaceMatch, ProviderKind,
    SubAttraction,
};
use crate::infra::config::Config;
use crate::infra::credentials::{Credentials, KeyValueStore, MapCredentials};
use crate::infra::metrics::{MetricsSummary, ProviderMetrics};
use crate::infra::notify::{Notification, Notifier};
use crate::io::amap::AmapSdk;
use crate::io::deepseek::DeepSeekClient;
use crate::io::gemini::GeminiClient;
use crate::services::audio::NarrationSource;
use crate::services::providers::{
    ChatProvider, DomesticLlm, GenerateRequest, MapProvider, MapSdk, MultimodalLlm,
    MultimodalProvider, NearbyQuery, Poi, ProviderError,
};
use crate::services::sdk_loader::MapSdkLoader;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

const GUIDE_ASSISTANT_SYSTEM: &str = "你是一个导游助手。";
const GUIDE_SYSTEM: &str = "你是一个导游。";
const NARRATOR_SYSTEM: &str = "你是一位专业导游。";
const NO_DESCRIPTION: &str = "暂无简介";
const UNKNOWN_LOCATION: &str = "未知位置";
const GROUNDED_NEARBY_PROMPT: &str = "Find 5 popular tourist landmarks near this location.";

/// Loosely-typed place entry as LLMs return it
#[derive(Debug, Deserialize)]
struct RawPlace {
    name: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl RawPlace {
    fn named(self) -> Option<(String, String, String)> {
        let name = self.name.filter(|n| !n.trim().is_empty())?;
        Some((name, self.description.unwrap_or_default(), self.kind.unwrap_or_default()))
    }
}

#[derive(Debug, Deserialize)]
struct RawIdentification {
    name: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    script: Option<String>,
}

impl RawIdentification {
    fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct RawLatLng {
    latitude: f64,
    longitude: f64,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Time-ordered id for an identified landmark
fn identification_id() -> String {
    format!("id-{}", uuid::Uuid::now_v7())
}

fn nearby_landmark(poi: Poi) -> Landmark {
    let kind = poi.primary_kind().to_string();
    let description = if poi.kind.is_empty() { NO_DESCRIPTION.to_string() } else { poi.kind.clone() };
    let mut landmark = Landmark::new(poi.id, poi.name, description);
    if let Some(d) = poi.distance_m {
        landmark = landmark.with_distance(format!("{}米", d));
    }
    if !kind.is_empty() {
        landmark = landmark.with_kind(kind);
    }
    landmark
}

fn search_landmark(poi: Poi) -> Landmark {
    let kind = poi.primary_kind().to_string();
    let description = poi
        .address
        .clone()
        .or_else(|| (!poi.kind.is_empty()).then(|| poi.kind.clone()))
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());
    let landmark = Landmark::new(poi.id, poi.name, description).with_distance("搜索结果");
    if kind.is_empty() {
        landmark
    } else {
        landmark.with_kind(kind)
    }
}

/// Service-resolution core: one instance per process, shared behind an `Arc`
pub struct GuideService {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    map_sdk: MapSdkLoader,
    domestic: DomesticLlm,
    multimodal: MultimodalLlm,
    notifier: Notifier,
    metrics: ProviderMetrics,
}

impl GuideService {
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        map_sdk: Arc<dyn MapSdk>,
        chat: Arc<dyn ChatProvider>,
        multimodal: Arc<dyn MultimodalProvider>,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            store,
            map_sdk: MapSdkLoader::new(map_sdk, notifier.clone()),
            domestic: DomesticLlm::new(chat),
            multimodal: MultimodalLlm::new(multimodal),
            notifier,
            metrics: ProviderMetrics::new(),
        }
    }

    /// Wire the HTTP clients named by the configuration
    pub fn from_config(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        notifier: Notifier,
    ) -> anyhow::Result<Self> {
        let map_sdk = Arc::new(AmapSdk::new(config.map_base_url(), config.map_timeout()));
        let chat = DeepSeekClient::new(
            config.domestic_llm_base_url(),
            config.domestic_llm_model(),
            config.domestic_llm_timeout(),
        )
        .context("Failed to build domestic LLM client")?;
        let multimodal = GeminiClient::new(
            config.multimodal_base_url(),
            config.multimodal_model(),
            config.multimodal_timeout(),
        )
        .context("Failed to build multimodal LLM client")?;
        Ok(Self::new(config, store, map_sdk, Arc::new(chat), Arc::new(multimodal), notifier))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.snapshot()
    }

    /// Credentials are re-read on every capability call
    pub fn credentials(&self) -> Credentials {
        Credentials::load(self.store.as_ref())
    }

    /// The loaded map provider, if map credentials exist and the SDK loads
    pub async fn map_provider(&self) -> Option<Arc<dyn MapProvider>> {
        let creds = self.credentials().map()?;
        self.map_sdk.get(&creds).await.ok()
    }

    fn skip(&self, capability: Capability, provider: ProviderKind) {
        self.metrics.record_skip(provider);
        debug!(capability = capability.as_str(), provider = provider.as_str(), "provider_skipped");
        self.notifier.emit(Notification::CredentialsMissing { provider: provider.to_string() });
    }

    fn map_credentials(&self, creds: &Credentials, capability: Capability) -> Option<MapCredentials> {
        let map = creds.map();
        if map.is_none() {
            self.skip(capability, ProviderKind::Map);
        }
        map
    }

    fn domestic_key<'a>(&self, creds: &'a Credentials, capability: Capability) -> Option<&'a str> {
        let key = creds.domestic_llm();
        if key.is_none() {
            self.skip(capability, ProviderKind::DomesticLlm);
        }
        key
    }

    fn multimodal_key<'a>(&self, creds: &'a Credentials, capability: Capability) -> Option<&'a str> {
        let key = creds.multimodal();
        if key.is_none() {
            self.skip(capability, ProviderKind::Multimodal);
        }
        key
    }

    /// Run one provider call; `Some` only for a usable result
    async fn attempt<T, F>(
        &self,
        capability: Capability,
        provider: ProviderKind,
        call: F,
        usable: impl Fn(&T) -> bool,
    ) -> Option<T>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        self.metrics.record_attempt(provider);
        debug!(capability = capability.as_str(), provider = provider.as_str(), "provider_attempt");

        match call.await {
            Ok(value) if usable(&value) => {
                self.metrics.record_success(provider);
                info!(capability = capability.as_str(), provider = provider.as_str(), "provider_succeeded");
                Some(value)
            }
            Ok(_) => {
                self.metrics.record_failure(provider);
                warn!(capability = capability.as_str(), provider = provider.as_str(), "provider_unusable");
                None
            }
            Err(e) => {
                self.metrics.record_failure(provider);
                warn!(
                    capability = capability.as_str(),
                    provider = provider.as_str(),
                    error = %e,
                    "provider_failed"
                );
                if matches!(
                    capability,
                    Capability::NearbySearch | Capability::TextSearch | Capability::LocationSearch
                ) {
                    self.notifier.emit(Notification::SearchFailed {
                        capability: capability.as_str().to_string(),
                        detail: e.to_string(),
                    });
                }
                None
            }
        }
    }

    fn mock_fallback(&self, capability: Capability) {
        self.metrics.record_mock_fallback(capability);
        info!(capability = capability.as_str(), "mock_fallback");
    }

    /// Landmarks around `at`: map radius search, grounded multimodal search, mock list
    pub async fn nearby_landmarks(&self, at: Coordinates) -> Vec<Landmark> {
        let capability = Capability::NearbySearch;
        let creds = self.credentials();

        if let Some(map_creds) = self.map_credentials(&creds, capability) {
            let query = NearbyQuery {
                center: at,
                radius_m: self.config.nearby_radius_m(),
                types: self.config.nearby_types().to_string(),
                page_size: self.config.page_size(),
            };
            let call = async {
                let map = self.map_sdk.get(&map_creds).await?;
                map.nearby(&query).await
            };
            if let Some(pois) = self.attempt(capability, ProviderKind::Map, call, |p| !p.is_empty()).await {
                return pois.into_iter().map(nearby_landmark).collect();
            }
        }

        if let Some(key) = self.multimodal_key(&creds, capability) {
            let call = self.multimodal.grounded_titles(key, GROUNDED_NEARBY_PROMPT, at);
            if let Some(titles) =
                self.attempt(capability, ProviderKind::Multimodal, call, |t| !t.is_empty()).await
            {
                return titles
                    .into_iter()
                    .enumerate()
                    .map(|(i, title)| {
                        Landmark::new(format!("g-{}", i), title, "Google Maps 推荐景点")
                            .with_distance("附近")
                            .with_kind("景点")
                    })
                    .collect();
            }
        }

        self.mock_fallback(capability);
        mock::nearby_landmarks()
    }

    /// Keyword search: map, multimodal JSON list, mock stubs
    pub async fn search_landmarks(&self, query: &str) -> Vec<Landmark> {
        let capability = Capability::TextSearch;
        let creds = self.credentials();

        if let Some(map_creds) = self.map_credentials(&creds, capability) {
            let call = async {
                let map = self.map_sdk.get(&map_creds).await?;
                map.keyword_search(query, self.config.page_size()).await
            };
            if let Some(pois) = self.attempt(capability, ProviderKind::Map, call, |p| !p.is_empty()).await {
                return pois.into_iter().map(search_landmark).collect();
            }
        }

        if let Some(key) = self.multimodal_key(&creds, capability) {
            let request = GenerateRequest::text(format!(
                "Search for landmarks matching \"{}\". Return JSON array: [{{\"name\":\"Name\", \"description\":\"Desc\", \"type\":\"Type\"}}]",
                query
            ));
            let call = async {
                let places = self.multimodal.json_array::<RawPlace>(key, &request).await?;
                Ok::<_, ProviderError>(places.into_iter().filter_map(RawPlace::named).collect::<Vec<_>>())
            };
            if let Some(places) =
                self.attempt(capability, ProviderKind::Multimodal, call, |p| !p.is_empty()).await
            {
                return places
                    .into_iter()
                    .enumerate()
                    .map(|(i, (name, description, kind))| {
                        Landmark::new(format!("gem-search-{}", i), name, description)
                            .with_distance("未知")
                            .with_kind(kind)
                    })
                    .collect();
            }
        }

        self.mock_fallback(capability);
        mock::search_results(query)
    }

    /// A single place to relocate to; `None` when nothing matches
    pub async fn search_location(&self, query: &str) -> Option<PlaceMatch> {
        let capability = Capability::LocationSearch;
        let creds = self.credentials();

        if let Some(map_creds) = self.map_credentials(&creds, capability) {
            let call = async {
                let map = self.map_sdk.get(&map_creds).await?;
                let pois = map.keyword_search(query, 1).await?;
                Ok::<_, ProviderError>(pois.into_iter().find_map(|p| {
                    let coords = p.location?;
                    Some(PlaceMatch { coords, address: p.address.unwrap_or(p.name) })
                }))
            };
            if let Some(Some(place)) =
                self.attempt(capability, ProviderKind::Map, call, |p| p.is_some()).await
            {
                return Some(place);
            }
        }

        if let Some(key) = self.multimodal_key(&creds, capability) {
            let request = GenerateRequest::text(format!(
                "Return the latitude and longitude of \"{}\" in JSON format: {{\"latitude\": number, \"longitude\": number}}",
                query
            ));
            let call = self.multimodal.json_object::<RawLatLng>(key, &request);
            let valid = |c: &RawLatLng| {
                c.latitude.is_finite()
                    && c.longitude.is_finite()
                    && c.latitude != 0.0
                    && c.longitude != 0.0
            };
            if let Some(c) = self.attempt(capability, ProviderKind::Multimodal, call, valid).await {
                return Some(PlaceMatch {
                    coords: Coordinates::new(c.latitude, c.longitude),
                    address: query.to_string(),
                });
            }
        }

        self.mock_fallback(capability);
        mock::place_for_query(query)
    }

    /// Points of interest inside a landmark: domestic LLM, multimodal LLM, mock pair
    pub async fn sub_attractions(&self, landmark_name: &str) -> Vec<SubAttraction> {
        let capability = Capability::SubAttractions;
        let creds = self.credentials();
        let prompt = format!(
            "列出\"{}\"内部的3-5个著名具体景观。返回JSON数组: [{{\"name\":\"景观名\",\"description\":\"简短介绍\",\"type\":\"类型\"}}]",
            landmark_name
        );

        let mut found = None;
        if let Some(key) = self.domestic_key(&creds, capability) {
            let call = async {
                let places =
                    self.domestic.json_array::<RawPlace>(key, GUIDE_ASSISTANT_SYSTEM, &prompt).await?;
                Ok::<_, ProviderError>(places.into_iter().filter_map(RawPlace::named).collect::<Vec<_>>())
            };
            found = self.attempt(capability, ProviderKind::DomesticLlm, call, |p| !p.is_empty()).await;
        }

        if found.is_none() {
            if let Some(key) = self.multimodal_key(&creds, capability) {
                let request = GenerateRequest::text(prompt.as_str());
                let call = async {
                    let places = self.multimodal.json_array::<RawPlace>(key, &request).await?;
                    Ok::<_, ProviderError>(places.into_iter().filter_map(RawPlace::named).collect::<Vec<_>>())
                };
                found =
                    self.attempt(capability, ProviderKind::Multimodal, call, |p| !p.is_empty()).await;
            }
        }

        match found {
            Some(places) => {
                let ts = now_ms();
                places
                    .into_iter()
                    .enumerate()
                    .map(|(i, (name, description, kind))| SubAttraction {
                        id: format!("sub-{}-{}", i, ts),
                        name,
                        description,
                        kind,
                    })
                    .collect()
            }
            None => {
                self.mock_fallback(capability);
                mock::sub_attractions()
            }
        }
    }

    /// Fetch sub-attractions once and attach them to the landmark
    pub async fn ensure_sub_attractions(&self, landmark: &mut Landmark) {
        if landmark.sub_attractions.as_ref().is_some_and(|s| !s.is_empty()) {
            debug!(name = %landmark.name, "sub_attractions_cached");
            return;
        }
        let subs = self.sub_attractions(&landmark.name).await;
        landmark.sub_attractions = Some(subs);
    }

    /// Spoken narration for a landmark: domestic LLM, multimodal LLM, canned template
    pub async fn narration(&self, landmark_name: &str) -> String {
        let capability = Capability::Narration;
        let creds = self.credentials();
        let user_prompt = format!("为“{}”写一段100字左右的生动口语讲解词。", landmark_name);

        if let Some(key) = self.domestic_key(&creds, capability) {
            let call = self.domestic.text(key, NARRATOR_SYSTEM, &user_prompt);
            if let Some(text) = self.attempt(capability, ProviderKind::DomesticLlm, call, |_| true).await {
                return text;
            }
        }

        if let Some(key) = self.multimodal_key(&creds, capability) {
            let request = GenerateRequest::text(format!("{} {}", NARRATOR_SYSTEM, user_prompt));
            let call = self.multimodal.text(key, &request);
            if let Some(text) = self.attempt(capability, ProviderKind::Multimodal, call, |_| true).await {
                return text;
            }
        }

        self.mock_fallback(capability);
        mock::narration(landmark_name)
    }

    /// "Where am I" context for the text-only identification prompt
    async fn location_context(&self, creds: &Credentials, at: Coordinates) -> String {
        let capability = Capability::Identify;
        let Some(map_creds) = self.map_credentials(creds, capability) else {
            return UNKNOWN_LOCATION.to_string();
        };
        let call = async {
            let map = self.map_sdk.get(&map_creds).await?;
            map.reverse_geocode(at).await
        };
        match self
            .attempt(capability, ProviderKind::Map, call, |r| r.formatted_address.is_some())
            .await
        {
            Some(regeo) => {
                let mut context = regeo.formatted_address.unwrap_or_default();
                if let Some(first) = regeo.nearby_poi_names.first() {
                    context.push_str(&format!("，紧邻{}", first));
                }
                context
            }
            None => UNKNOWN_LOCATION.to_string(),
        }
    }

    /// Identify what the user is looking at.
    ///
    /// Text-only requests try the domestic LLM with reverse-geocoded context
    /// first; images always go to the multimodal LLM.
    pub async fn identify(
        &self,
        at: Coordinates,
        image: Option<ImageInput>,
        user_query: Option<&str>,
    ) -> Identification {
        let capability = Capability::Identify;
        let creds = self.credentials();
        let user_query = user_query.map(str::trim).filter(|q| !q.is_empty());

        if image.is_none() {
            if let Some(key) = self.domestic_key(&creds, capability) {
                let context = self.location_context(&creds, at).await;
                let prompt = format!(
                    "我在{}。{} 请返回JSON: {{\"name\":\"\", \"description\":\"\", \"type\":\"\", \"script\":\"\"}}",
                    context,
                    user_query.unwrap_or("这是什么？")
                );
                let call = self.domestic.json_object::<RawIdentification>(key, GUIDE_SYSTEM, &prompt);
                if let Some(raw) =
                    self.attempt(capability, ProviderKind::DomesticLlm, call, RawIdentification::has_name).await
                {
                    let landmark = Landmark {
                        id: identification_id(),
                        name: raw.name.unwrap_or_default(),
                        description: raw.description.unwrap_or_default(),
                        distance: Some("当前".to_string()),
                        kind: non_blank(raw.kind),
                        sub_attractions: None,
                    };
                    return self.complete_identification(landmark, raw.script).await;
                }
            }
        }

        if let Some(key) = self.multimodal_key(&creds, capability) {
            let request = GenerateRequest {
                prompt: format!(
                    "I am at lat:{}, lng:{}. {} Return JSON: {{\"name\": \"Chinese Name\", \"description\": \"Short desc\", \"type\": \"Type\", \"script\": \"Chinese audio script\"}}",
                    at.latitude,
                    at.longitude,
                    user_query.unwrap_or("Identify this landmark or place.")
                ),
                image,
                grounding: None,
            };
            let call = self.multimodal.json_object::<RawIdentification>(key, &request);
            if let Some(raw) =
                self.attempt(capability, ProviderKind::Multimodal, call, RawIdentification::has_name).await
            {
                let landmark = Landmark::new(
                    identification_id(),
                    raw.name.unwrap_or_default(),
                    non_blank(raw.description).unwrap_or_else(|| "Gemini识别".to_string()),
                )
                .with_distance("当前")
                .with_kind(non_blank(raw.kind).unwrap_or_else(|| "景点".to_string()));
                return self.complete_identification(landmark, raw.script).await;
            }
        }

        self.mock_fallback(capability);
        Identification {
            landmark: mock::unidentified_landmark(user_query),
            script: mock::IDENTIFY_UNAVAILABLE_TEXT.to_string(),
        }
    }

    /// Fill a missing script with generated narration
    async fn complete_identification(&self, landmark: Landmark, script: Option<String>) -> Identification {
        let script = match non_blank(script) {
            Some(s) => s,
            None => self.narration(&landmark.name).await,
        };
        Identification { landmark, script }
    }
}

#[async_trait]
impl NarrationSource for GuideService {
    fn has_remote_credentials(&self) -> bool {
        self.credentials().has_any_remote()
    }

    async fn narrate(&self, landmark_name: &str) -> Result<String, ProviderError> {
        Ok(self.narration(landmark_name).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(kind: &str, address: Option<&str>, distance: Option<u32>) -> Poi {
        Poi {
            id: "B0".to_string(),
            name: "故宫博物院".to_string(),
            kind: kind.to_string(),
            distance_m: distance,
            address: address.map(str::to_string),
            location: None,
        }
    }

    #[test]
    fn test_nearby_landmark_normalization() {
        let lm = nearby_landmark(poi("风景名胜;风景名胜;世界遗产", Some("景山前街4号"), Some(812)));
        assert_eq!(lm.description, "风景名胜;风景名胜;世界遗产");
        assert_eq!(lm.distance.as_deref(), Some("812米"));
        assert_eq!(lm.kind.as_deref(), Some("风景名胜"));

        let bare = nearby_landmark(poi("", None, None));
        assert_eq!(bare.description, "暂无简介");
        assert_eq!(bare.distance, None);
        assert_eq!(bare.kind, None);
    }

    #[test]
    fn test_search_landmark_prefers_address() {
        let lm = search_landmark(poi("风景名胜;公园", Some("景山前街4号"), None));
        assert_eq!(lm.description, "景山前街4号");
        assert_eq!(lm.distance.as_deref(), Some("搜索结果"));

        let by_type = search_landmark(poi("风景名胜;公园", None, None));
        assert_eq!(by_type.description, "风景名胜;公园");

        let none = search_landmark(poi("", None, None));
        assert_eq!(none.description, "暂无简介");
    }

    #[test]
    fn test_raw_place_requires_name() {
        let named: RawPlace =
            serde_json::from_str(r#"{"name":"太和殿","description":null,"type":"建筑"}"#).unwrap();
        assert_eq!(named.named(), Some(("太和殿".to_string(), String::new(), "建筑".to_string())));

        let blank: RawPlace = serde_json::from_str(r#"{"name":"  "}"#).unwrap();
        assert!(blank.named().is_none());
    }
}
