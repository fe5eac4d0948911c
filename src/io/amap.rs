//! AMap web-service client (map/places provider)
//!
//! Endpoints used:
//! - `/v3/place/around` - category-filtered nearby search
//! - `/v3/place/text` - keyword search
//! - `/v3/geocode/regeo` - reverse geocoding with nearby POIs
//! - `/v3/assistant/coordinate/convert` - GPS (WGS-84) to GCJ-02
//! - `/v3/ip` - coarse IP geolocation
//!
//! Every request is signed: `sig = md5(sorted "k=v&..." + secret)`.
//! The service reports empty fields as `[]` rather than `""`, so text
//! fields go through a lenient deserializer.

use crate::domain::types::{Coordinates, Datum};
use crate::infra::credentials::MapCredentials;
use crate::services::providers::{
    MapProvider, MapSdk, NearbyQuery, Poi, ProviderError, ReverseGeocode,
};
use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const PATH_AROUND: &str = "/v3/place/around";
const PATH_TEXT: &str = "/v3/place/text";
const PATH_REGEO: &str = "/v3/geocode/regeo";
const PATH_CONVERT: &str = "/v3/assistant/coordinate/convert";
const PATH_IP: &str = "/v3/ip";

/// Text field that may arrive as a string, a number, `[]` or null
fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, IgnoredAny, SeqAccess, Visitor};

    struct TextVisitor;

    impl<'de> Visitor<'de> for TextVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string, number, empty array or null")
        }

        fn visit_str<E>(self, value: &str) -> Result<Option<String>, E>
        where
            E: de::Error,
        {
            let trimmed = value.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<Option<String>, E>
        where
            E: de::Error,
        {
            self.visit_str(&value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_unit<E>(self) -> Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Option<String>, A::Error>
        where
            A: SeqAccess<'de>,
        {
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            Ok(None)
        }
    }

    deserializer.deserialize_any(TextVisitor)
}

/// Common response envelope; `status` is `"1"` on success
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default, deserialize_with = "deserialize_text")]
    status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    info: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Deserialize)]
struct RawPoi {
    #[serde(default, deserialize_with = "deserialize_text")]
    id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    name: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "deserialize_text")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    address: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    distance: Option<String>,
}

impl RawPoi {
    /// Nameless entries are dropped
    fn into_poi(self, index: usize) -> Option<Poi> {
        let name = self.name?;
        Some(Poi {
            id: self.id.unwrap_or_else(|| format!("poi-{}", index)),
            name,
            kind: self.kind.unwrap_or_default(),
            distance_m: self.distance.and_then(|d| d.parse::<f64>().ok()).map(|d| d.round() as u32),
            address: self.address,
            location: self.location.as_deref().and_then(Coordinates::from_lng_lat),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PoiList {
    #[serde(default)]
    pois: Vec<RawPoi>,
}

#[derive(Debug, Deserialize)]
struct RegeoBody {
    regeocode: Option<Regeocode>,
}

#[derive(Debug, Deserialize)]
struct Regeocode {
    #[serde(default, deserialize_with = "deserialize_text")]
    formatted_address: Option<String>,
    #[serde(default)]
    pois: Vec<RawPoi>,
}

#[derive(Debug, Deserialize)]
struct ConvertBody {
    #[serde(default, deserialize_with = "deserialize_text")]
    locations: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpBody {
    /// `"lng,lat;lng,lat"` bounding box of the caller's city
    #[serde(default, deserialize_with = "deserialize_text")]
    rectangle: Option<String>,
}

/// Signature over the request parameters, sorted by name
pub fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join("&");
    hex::encode(Md5::digest(format!("{}{}", joined, secret).as_bytes()))
}

fn rectangle_center(rectangle: &str) -> Option<Coordinates> {
    let (a, b) = rectangle.split_once(';')?;
    let a = Coordinates::from_lng_lat(a)?;
    let b = Coordinates::from_lng_lat(b)?;
    Some(Coordinates::new((a.latitude + b.latitude) / 2.0, (a.longitude + b.longitude) / 2.0))
}

/// Signed REST client bound to one key pair
pub struct AmapClient {
    http: reqwest::Client,
    base_url: String,
    credentials: MapCredentials,
}

impl AmapClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: MapCredentials,
    ) -> Result<Self, ProviderError> {
        // Create HTTP client once for reuse (connection pooling)
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::SdkUnavailable(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), credentials })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T, ProviderError> {
        params.push(("key", self.credentials.key.clone()));
        let sig = sign(&params, &self.credentials.secret);
        params.push(("sig", sig));

        let url = format!("{}{}", self.base_url, path);
        debug!(path = %path, "amap_request");
        let response = self.http.get(&url).query(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let envelope: Envelope<T> =
            response.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))?;
        if envelope.status.as_deref() != Some("1") {
            return Err(ProviderError::Api(envelope.info.unwrap_or_else(|| "unknown".to_string())));
        }
        Ok(envelope.body)
    }

    fn collect_pois(raw: Vec<RawPoi>) -> Vec<Poi> {
        raw.into_iter().enumerate().filter_map(|(i, p)| p.into_poi(i)).collect()
    }
}

#[async_trait]
impl MapProvider for AmapClient {
    async fn nearby(&self, query: &NearbyQuery) -> Result<Vec<Poi>, ProviderError> {
        let params = vec![
            ("location", query.center.to_lng_lat()),
            ("radius", query.radius_m.to_string()),
            ("types", query.types.clone()),
            ("offset", query.page_size.to_string()),
            ("page", "1".to_string()),
            ("extensions", "base".to_string()),
        ];
        let body: PoiList = self.get(PATH_AROUND, params).await?;
        Ok(Self::collect_pois(body.pois))
    }

    async fn keyword_search(&self, keywords: &str, page_size: u32) -> Result<Vec<Poi>, ProviderError> {
        let params = vec![
            ("keywords", keywords.to_string()),
            ("offset", page_size.to_string()),
            ("page", "1".to_string()),
        ];
        let body: PoiList = self.get(PATH_TEXT, params).await?;
        Ok(Self::collect_pois(body.pois))
    }

    async fn reverse_geocode(&self, at: Coordinates) -> Result<ReverseGeocode, ProviderError> {
        let params = vec![("location", at.to_lng_lat()), ("extensions", "all".to_string())];
        let body: RegeoBody = self.get(PATH_REGEO, params).await?;
        let regeo = body.regeocode.ok_or(ProviderError::Empty)?;
        Ok(ReverseGeocode {
            formatted_address: regeo.formatted_address,
            nearby_poi_names: regeo.pois.into_iter().filter_map(|p| p.name).collect(),
        })
    }

    async fn convert(&self, at: Coordinates, from: Datum) -> Result<Coordinates, ProviderError> {
        if from == Datum::Gcj02 {
            return Ok(at);
        }
        let params = vec![("locations", at.to_lng_lat()), ("coordsys", from.as_str().to_string())];
        let body: ConvertBody = self.get(PATH_CONVERT, params).await?;
        body.locations
            .as_deref()
            .and_then(|l| l.split(';').next())
            .and_then(Coordinates::from_lng_lat)
            .ok_or_else(|| ProviderError::Malformed("no converted location".to_string()))
    }

    async fn locate(&self) -> Result<Coordinates, ProviderError> {
        let body: IpBody = self.get(PATH_IP, Vec::new()).await?;
        body.rectangle.as_deref().and_then(rectangle_center).ok_or(ProviderError::Empty)
    }
}

/// Builds [`AmapClient`]s; this is the "SDK load" step
pub struct AmapSdk {
    base_url: String,
    timeout: Duration,
}

impl AmapSdk {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self { base_url: base_url.to_string(), timeout }
    }
}

#[async_trait]
impl MapSdk for AmapSdk {
    async fn load(&self, credentials: &MapCredentials) -> Result<Arc<dyn MapProvider>, ProviderError> {
        let client = AmapClient::new(&self.base_url, self.timeout, credentials.clone())?;
        info!(base_url = %self.base_url, "amap_client_ready");
        Ok(Arc::new(client))
    }
}
