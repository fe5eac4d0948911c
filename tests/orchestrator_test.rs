//! Integration tests for provider fallback order
//!
//! Providers are in-process fakes that record every call, so each test can
//! assert which providers were reached and which were skipped.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use travel_guide::domain::mock::IDENTIFY_UNAVAILABLE_TEXT;
use travel_guide::domain::{Capability, Coordinates, Datum, ImageInput, ProviderKind};
use travel_guide::infra::{
    Config, CredentialKey, KeyValueStore, MapCredentials, MemoryStore, Notification, Notifier,
};
use travel_guide::services::{
    ChatProvider, GenerateRequest, GenerateResponse, GuideService, MapProvider, MapSdk,
    MultimodalProvider, NearbyQuery, Poi, ProviderError, ReverseGeocode,
};

const HERE: Coordinates = Coordinates::new(39.9163, 116.3972);

#[derive(Default)]
struct FakeMap {
    pois: Vec<Poi>,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeMap {
    fn with_pois(pois: Vec<Poi>) -> Self {
        Self { pois, ..Self::default() }
    }

    fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    fn result(&self, call: &str) -> Result<Vec<Poi>, ProviderError> {
        self.calls.lock().push(call.to_string());
        if self.fail {
            return Err(ProviderError::Api("INVALID_USER_KEY".to_string()));
        }
        Ok(self.pois.clone())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MapProvider for FakeMap {
    async fn nearby(&self, _query: &NearbyQuery) -> Result<Vec<Poi>, ProviderError> {
        self.result("nearby")
    }

    async fn keyword_search(&self, keywords: &str, _page_size: u32) -> Result<Vec<Poi>, ProviderError> {
        self.result(&format!("search:{}", keywords))
    }

    async fn reverse_geocode(&self, _at: Coordinates) -> Result<ReverseGeocode, ProviderError> {
        self.calls.lock().push("regeo".to_string());
        Ok(ReverseGeocode {
            formatted_address: Some("北京市东城区景山前街4号".to_string()),
            nearby_poi_names: vec!["故宫博物院".to_string()],
        })
    }

    async fn convert(&self, at: Coordinates, _from: Datum) -> Result<Coordinates, ProviderError> {
        Ok(at)
    }

    async fn locate(&self) -> Result<Coordinates, ProviderError> {
        Ok(HERE)
    }
}

struct FakeSdk {
    map: Arc<FakeMap>,
    loads: AtomicUsize,
}

#[async_trait]
impl MapSdk for FakeSdk {
    async fn load(&self, _credentials: &MapCredentials) -> Result<Arc<dyn MapProvider>, ProviderError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.map.clone())
    }
}

/// Chat LLM returning a fixed reply (or failing when `None`)
struct FakeChat {
    reply: Option<&'static str>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl FakeChat {
    fn replying(reply: &'static str) -> Self {
        Self { reply: Some(reply), prompts: Mutex::new(Vec::new()) }
    }

    fn failing() -> Self {
        Self { reply: None, prompts: Mutex::new(Vec::new()) }
    }

    fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for FakeChat {
    async fn complete(&self, _key: &str, system: &str, user: &str) -> Result<String, ProviderError> {
        self.prompts.lock().push((system.to_string(), user.to_string()));
        self.reply
            .map(str::to_string)
            .ok_or(ProviderError::Status { status: 401, body: "invalid key".to_string() })
    }
}

/// Multimodal LLM returning fixed text and grounding titles
struct FakeMultimodal {
    text: Option<&'static str>,
    titles: Vec<&'static str>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl FakeMultimodal {
    fn replying(text: &'static str) -> Self {
        Self { text: Some(text), titles: Vec::new(), requests: Mutex::new(Vec::new()) }
    }

    fn grounded(titles: Vec<&'static str>) -> Self {
        Self { text: None, titles, requests: Mutex::new(Vec::new()) }
    }

    fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl MultimodalProvider for FakeMultimodal {
    async fn generate(&self, _key: &str, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        self.requests.lock().push(request.clone());
        Ok(GenerateResponse {
            text: self.text.map(str::to_string),
            grounding_titles: self.titles.iter().map(|t| t.to_string()).collect(),
        })
    }
}

struct Fixture {
    guide: GuideService,
    store: Arc<dyn KeyValueStore>,
    sdk: Arc<FakeSdk>,
    map: Arc<FakeMap>,
    chat: Arc<FakeChat>,
    multimodal: Arc<FakeMultimodal>,
    notifications: tokio::sync::broadcast::Receiver<Notification>,
}

impl Fixture {
    fn new(keys: &[CredentialKey], map: FakeMap, chat: FakeChat, multimodal: FakeMultimodal) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        for key in keys {
            store.set(key.as_str(), "test-key");
        }
        let map = Arc::new(map);
        let sdk = Arc::new(FakeSdk { map: map.clone(), loads: AtomicUsize::new(0) });
        let chat = Arc::new(chat);
        let multimodal = Arc::new(multimodal);
        let notifier = Notifier::default();
        let notifications = notifier.subscribe();
        let guide = GuideService::new(
            Config::default(),
            store.clone(),
            sdk.clone(),
            chat.clone(),
            multimodal.clone(),
            notifier,
        );
        Self { guide, store, sdk, map, chat, multimodal, notifications }
    }

    fn notifications(&mut self) -> Vec<Notification> {
        let mut seen = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            seen.push(n);
        }
        seen
    }
}

fn all_keys() -> Vec<CredentialKey> {
    CredentialKey::ALL.to_vec()
}

fn poi(id: &str, name: &str, distance_m: u32) -> Poi {
    Poi {
        id: id.to_string(),
        name: name.to_string(),
        kind: "风景名胜;风景名胜相关;旅游景点".to_string(),
        distance_m: Some(distance_m),
        address: Some("景山前街4号".to_string()),
        location: Some(HERE),
    }
}

fn names<T>(items: &[T], name: impl Fn(&T) -> &str) -> Vec<String> {
    items.iter().map(|i| name(i).to_string()).collect()
}

#[tokio::test]
async fn test_no_credentials_serves_mock_nearby() {
    let mut fx = Fixture::new(&[], FakeMap::default(), FakeChat::failing(), FakeMultimodal::replying("x"));

    let landmarks = fx.guide.nearby_landmarks(HERE).await;

    assert_eq!(
        names(&landmarks, |l| &l.name),
        ["天安门广场", "国家博物馆", "故宫博物院", "景山公园", "王府井大街"]
    );
    assert_eq!(fx.sdk.loads.load(Ordering::SeqCst), 0);
    assert!(fx.multimodal.requests().is_empty());

    let metrics = fx.guide.metrics();
    assert_eq!(metrics.provider(ProviderKind::Map).skips, 1);
    assert_eq!(metrics.provider(ProviderKind::Multimodal).skips, 1);
    assert_eq!(metrics.provider(ProviderKind::Map).attempts, 0);
    assert_eq!(metrics.mock_fallbacks(Capability::NearbySearch), 1);

    assert_eq!(
        fx.notifications(),
        vec![
            Notification::CredentialsMissing { provider: "map".to_string() },
            Notification::CredentialsMissing { provider: "multimodal".to_string() },
        ]
    );
}

#[tokio::test]
async fn test_map_result_short_circuits_chain() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::with_pois(vec![poi("B1", "故宫博物院", 120), poi("B2", "景山公园", 640)]),
        FakeChat::failing(),
        FakeMultimodal::grounded(vec!["颐和园"]),
    );

    let landmarks = fx.guide.nearby_landmarks(HERE).await;

    assert_eq!(names(&landmarks, |l| &l.name), ["故宫博物院", "景山公园"]);
    assert_eq!(landmarks[0].id, "B1");
    assert_eq!(landmarks[0].distance.as_deref(), Some("120米"));
    assert_eq!(landmarks[0].kind.as_deref(), Some("风景名胜"));
    assert!(fx.multimodal.requests().is_empty());
    assert_eq!(fx.guide.metrics().provider(ProviderKind::Map).successes, 1);
}

#[tokio::test]
async fn test_empty_map_result_falls_through_to_grounded_titles() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::with_pois(Vec::new()),
        FakeChat::failing(),
        FakeMultimodal::grounded(vec!["颐和园", "圆明园"]),
    );

    let landmarks = fx.guide.nearby_landmarks(HERE).await;

    assert_eq!(names(&landmarks, |l| &l.name), ["颐和园", "圆明园"]);
    assert_eq!(landmarks[1].id, "g-1");
    assert_eq!(landmarks[0].description, "Google Maps 推荐景点");
    assert_eq!(landmarks[0].distance.as_deref(), Some("附近"));

    let requests = fx.multimodal.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].grounding, Some(HERE));

    let metrics = fx.guide.metrics();
    assert_eq!(metrics.provider(ProviderKind::Map).failures, 1);
    assert_eq!(metrics.provider(ProviderKind::Multimodal).successes, 1);
}

#[tokio::test]
async fn test_map_error_reports_search_failure() {
    let mut fx = Fixture::new(
        &[CredentialKey::MapKey, CredentialKey::MapSecret],
        FakeMap::failing(),
        FakeChat::failing(),
        FakeMultimodal::replying("unused"),
    );

    let results = fx.guide.search_landmarks("故宫").await;

    assert_eq!(names(&results, |l| &l.name), ["故宫 (模拟结果)", "周边推荐景点"]);
    assert_eq!(fx.map.calls(), ["search:故宫"]);

    let seen = fx.notifications();
    assert!(seen.iter().any(|n| matches!(
        n,
        Notification::SearchFailed { capability, .. } if capability == "text_search"
    )));
    assert!(seen.contains(&Notification::CredentialsMissing { provider: "multimodal".to_string() }));
}

#[tokio::test]
async fn test_credentials_are_read_per_call() {
    let fx = Fixture::new(
        &[],
        FakeMap::with_pois(vec![poi("B1", "故宫博物院", 120)]),
        FakeChat::failing(),
        FakeMultimodal::replying("unused"),
    );

    let before = fx.guide.nearby_landmarks(HERE).await;
    assert_eq!(before.len(), 5);

    fx.store.set(CredentialKey::MapKey.as_str(), "k");
    fx.store.set(CredentialKey::MapSecret.as_str(), "s");
    let after = fx.guide.nearby_landmarks(HERE).await;
    assert_eq!(names(&after, |l| &l.name), ["故宫博物院"]);
}

#[tokio::test]
async fn test_unparseable_sub_attractions_fall_back_to_mock() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::default(),
        FakeChat::replying("抱歉，我无法回答这个问题。"),
        FakeMultimodal::replying("Sorry, I can't help with that."),
    );

    let subs = fx.guide.sub_attractions("故宫博物院").await;

    assert_eq!(names(&subs, |s| &s.name), ["主要殿堂", "花园区"]);
    assert_eq!(fx.chat.prompts().len(), 1);
    assert_eq!(fx.multimodal.requests().len(), 1);
    assert_eq!(fx.guide.metrics().mock_fallbacks(Capability::SubAttractions), 1);
}

#[tokio::test]
async fn test_sub_attractions_from_domestic_llm() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::default(),
        FakeChat::replying(
            r#"好的，以下是故宫的景观：[{"name":"太和殿","description":"皇帝举行大典的地方","type":"建筑"},{"name":""}] 希望对您有帮助。"#,
        ),
        FakeMultimodal::replying("unused"),
    );

    let subs = fx.guide.sub_attractions("故宫博物院").await;

    assert_eq!(names(&subs, |s| &s.name), ["太和殿"]);
    assert!(subs[0].id.starts_with("sub-0-"));
    assert_eq!(subs[0].kind, "建筑");
    assert!(fx.multimodal.requests().is_empty());

    let (system, user) = &fx.chat.prompts()[0];
    assert_eq!(system, "你是一个导游助手。");
    assert!(user.contains("\"故宫博物院\""));
}

#[tokio::test]
async fn test_narration_falls_back_to_multimodal() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::default(),
        FakeChat::failing(),
        FakeMultimodal::replying("  欢迎来到故宫，这里曾是明清两代的皇宫。 "),
    );

    let text = fx.guide.narration("故宫").await;

    assert_eq!(text, "欢迎来到故宫，这里曾是明清两代的皇宫。");
    let requests = fx.multimodal.requests();
    assert!(requests[0].prompt.starts_with("你是一位专业导游。 为“故宫”"));
    assert_eq!(fx.guide.metrics().provider(ProviderKind::DomesticLlm).failures, 1);
}

#[tokio::test]
async fn test_identify_with_image_skips_domestic_path() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::default(),
        FakeChat::replying("这是一段讲解词。"),
        FakeMultimodal::replying(r#"```json
{"name":"天坛","description":"","type":""}
```"#),
    );

    let image = ImageInput::jpeg(vec![0xFF, 0xD8, 0xFF]);
    let result = fx.guide.identify(HERE, Some(image.clone()), Some("这是哪里？")).await;

    assert_eq!(result.landmark.name, "天坛");
    assert!(result.landmark.id.starts_with("id-"));
    assert_eq!(result.landmark.description, "Gemini识别");
    assert_eq!(result.landmark.kind.as_deref(), Some("景点"));
    assert_eq!(result.landmark.distance.as_deref(), Some("当前"));
    assert_eq!(fx.multimodal.requests()[0].image, Some(image));

    // The only chat call fills in the missing script
    let prompts = fx.chat.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].0, "你是一位专业导游。");
    assert_eq!(result.script, "这是一段讲解词。");
    assert!(fx.map.calls().is_empty());
}

#[tokio::test]
async fn test_identify_text_only_uses_location_context() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::default(),
        FakeChat::replying(
            r#"{"name":"故宫博物院","description":"明清皇宫","type":"世界遗产","script":"您正站在故宫门前。"}"#,
        ),
        FakeMultimodal::replying("unused"),
    );

    let result = fx.guide.identify(HERE, None, None).await;

    assert_eq!(result.landmark.name, "故宫博物院");
    assert_eq!(result.landmark.kind.as_deref(), Some("世界遗产"));
    assert_eq!(result.script, "您正站在故宫门前。");
    assert_eq!(fx.map.calls(), ["regeo"]);
    assert!(fx.multimodal.requests().is_empty());

    let (system, user) = &fx.chat.prompts()[0];
    assert_eq!(system, "你是一个导游。");
    assert!(user.starts_with("我在北京市东城区景山前街4号，紧邻故宫博物院。这是什么？"));
}

#[tokio::test]
async fn test_identify_unavailable_without_credentials() {
    let fx = Fixture::new(&[], FakeMap::default(), FakeChat::failing(), FakeMultimodal::replying("x"));

    let result = fx.guide.identify(HERE, None, Some("那座塔叫什么")).await;

    assert_eq!(result.landmark.name, "古塔");
    assert_eq!(result.script, IDENTIFY_UNAVAILABLE_TEXT);
    assert!(fx.chat.prompts().is_empty());
}

#[tokio::test]
async fn test_search_location_rejects_zero_coordinates() {
    let fx = Fixture::new(
        &[CredentialKey::MultimodalKey],
        FakeMap::default(),
        FakeChat::failing(),
        FakeMultimodal::replying(r#"{"latitude": 0, "longitude": 0}"#),
    );

    let palace = fx.guide.search_location("故宫").await.unwrap();
    assert_eq!(palace.address, "北京市东城区 (演示)");
    assert!(fx.guide.search_location("上海外滩").await.is_none());
    assert_eq!(fx.guide.metrics().mock_fallbacks(Capability::LocationSearch), 2);
}

#[tokio::test]
async fn test_search_location_from_map() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::with_pois(vec![poi("B1", "故宫博物院", 0)]),
        FakeChat::failing(),
        FakeMultimodal::replying("unused"),
    );

    let place = fx.guide.search_location("故宫").await.unwrap();

    assert_eq!(place.coords, HERE);
    assert_eq!(place.address, "景山前街4号");
    assert!(fx.multimodal.requests().is_empty());
}

#[tokio::test]
async fn test_map_sdk_loaded_once_across_calls() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::with_pois(vec![poi("B1", "故宫博物院", 120)]),
        FakeChat::failing(),
        FakeMultimodal::replying("unused"),
    );

    fx.guide.nearby_landmarks(HERE).await;
    fx.guide.search_landmarks("故宫").await;
    fx.guide.search_location("故宫").await;

    assert_eq!(fx.sdk.loads.load(Ordering::SeqCst), 1);
    assert_eq!(fx.map.calls(), ["nearby", "search:故宫", "search:故宫"]);
}

#[tokio::test]
async fn test_text_search_falls_back_to_multimodal_list() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::with_pois(Vec::new()),
        FakeChat::replying("unused"),
        FakeMultimodal::replying(
            r#"[{"name":"故宫博物院","description":"明清皇宫","type":"博物馆"},{"name":"景山公园","description":"","type":""}]"#,
        ),
    );

    let results = fx.guide.search_landmarks("故宫").await;

    assert_eq!(names(&results, |l| &l.name), ["故宫博物院", "景山公园"]);
    assert_eq!(results[1].id, "gem-search-1");
    assert_eq!(results[0].distance.as_deref(), Some("未知"));
    assert_eq!(results[0].kind.as_deref(), Some("博物馆"));
    assert_eq!(fx.map.calls(), ["search:故宫"]);
    assert_eq!(fx.multimodal.requests().len(), 1);
    assert!(fx.chat.prompts().is_empty());
    assert_eq!(fx.guide.metrics().mock_fallbacks(Capability::TextSearch), 0);
}

#[tokio::test]
async fn test_narration_from_domestic_llm_stops_chain() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::default(),
        FakeChat::replying("故宫是明清两代的皇宫。"),
        FakeMultimodal::replying("unused"),
    );

    let text = fx.guide.narration("故宫").await;

    assert_eq!(text, "故宫是明清两代的皇宫。");
    assert_eq!(fx.chat.prompts().len(), 1);
    assert!(fx.multimodal.requests().is_empty());
    assert_eq!(fx.guide.metrics().provider(ProviderKind::DomesticLlm).successes, 1);
}

#[tokio::test]
async fn test_narration_template_when_both_llms_fail() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::default(),
        FakeChat::failing(),
        FakeMultimodal::grounded(Vec::new()),
    );

    let text = fx.guide.narration("颐和园").await;

    assert!(text.starts_with("欢迎来到颐和园。"));
    assert_eq!(fx.chat.prompts().len(), 1);
    assert_eq!(fx.multimodal.requests().len(), 1);

    let metrics = fx.guide.metrics();
    assert_eq!(metrics.provider(ProviderKind::DomesticLlm).failures, 1);
    assert_eq!(metrics.provider(ProviderKind::Multimodal).failures, 1);
    assert_eq!(metrics.mock_fallbacks(Capability::Narration), 1);
}

#[tokio::test]
async fn test_sub_attractions_fall_back_to_multimodal() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::default(),
        FakeChat::failing(),
        FakeMultimodal::replying(r#"[{"name":"长廊","description":"彩绘长廊","type":"建筑"}]"#),
    );

    let subs = fx.guide.sub_attractions("颐和园").await;

    assert_eq!(names(&subs, |s| &s.name), ["长廊"]);
    assert_eq!(subs[0].kind, "建筑");
    assert_eq!(fx.chat.prompts().len(), 1);
    let requests = fx.multimodal.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt.contains("\"颐和园\""));
    assert_eq!(fx.guide.metrics().mock_fallbacks(Capability::SubAttractions), 0);
}

#[tokio::test]
async fn test_identify_text_only_falls_back_to_multimodal_without_image() {
    let fx = Fixture::new(
        &all_keys(),
        FakeMap::default(),
        FakeChat::failing(),
        FakeMultimodal::replying(
            r#"{"name":"景山公园","description":"俯瞰故宫","type":"公园","script":"您现在位于景山公园。"}"#,
        ),
    );

    let result = fx.guide.identify(HERE, None, Some("这是哪里？")).await;

    assert_eq!(result.landmark.name, "景山公园");
    assert_eq!(result.script, "您现在位于景山公园。");
    assert_eq!(fx.chat.prompts().len(), 1);
    assert_eq!(fx.map.calls(), ["regeo"]);

    let requests = fx.multimodal.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].image, None);
    assert!(requests[0].prompt.contains("这是哪里？"));
}
