//! Shared types for the travel guide

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// A device or map position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// `"lat, lng"` with six decimals, used when no address can be resolved
    pub fn formatted(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }

    /// `"lng,lat"` as the map provider expects it
    pub fn to_lng_lat(&self) -> String {
        format!("{:.6},{:.6}", self.longitude, self.latitude)
    }

    /// Parse a `"lng,lat"` pair
    pub fn from_lng_lat(s: &str) -> Option<Self> {
        let (lng, lat) = s.split_once(',')?;
        let longitude = lng.trim().parse().ok()?;
        let latitude = lat.trim().parse().ok()?;
        Some(Self { latitude, longitude })
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

/// Geodetic datum a position is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datum {
    /// Raw GPS (WGS-84), what device sensors report
    Wgs84,
    /// GCJ-02, used by the domestic map provider
    Gcj02,
}

impl Datum {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datum::Wgs84 => "gps",
            Datum::Gcj02 => "gcj02",
        }
    }
}

/// A point of interest inside a landmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAttraction {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A point of interest normalized from any provider.
///
/// `id` is only unique within one result set. `name` is the identity used
/// by history and narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Landmark {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_attractions: Option<Vec<SubAttraction>>,
}

impl Landmark {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            distance: None,
            kind: None,
            sub_attractions: None,
        }
    }

    pub fn with_distance(mut self, distance: impl Into<String>) -> Self {
        self.distance = Some(distance.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Narration playback state consumed by display code.
///
/// `is_loading`, `is_playing` and `is_paused` are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioState {
    pub is_playing: bool,
    pub is_paused: bool,
    pub is_loading: bool,
    pub current_text: Option<String>,
    pub playing_item_name: Option<String>,
}

impl AudioState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn loading(name: &str) -> Self {
        Self { is_loading: true, playing_item_name: Some(name.to_string()), ..Self::default() }
    }

    pub fn playing(name: &str, text: &str) -> Self {
        Self {
            is_playing: true,
            current_text: Some(text.to_string()),
            playing_item_name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn is_active_for(&self, name: &str) -> bool {
        self.playing_item_name.as_deref() == Some(name)
    }
}

/// A narrated landmark remembered in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(flatten)]
    pub landmark: Landmark,
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

/// Image supplied for multimodal identification
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageInput {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self { mime_type: "image/jpeg".to_string(), bytes }
    }

    /// Decode a `data:<mime>;base64,<payload>` URL as produced by a camera capture.
    /// A bare base64 payload is accepted as JPEG.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let (mime_type, payload) = match url.split_once(',') {
            Some((header, payload)) => {
                let mime = header
                    .strip_prefix("data:")
                    .and_then(|h| h.strip_suffix(";base64"))
                    .filter(|m| !m.is_empty())
                    .unwrap_or("image/jpeg");
                (mime.to_string(), payload)
            }
            None => ("image/jpeg".to_string(), url),
        };
        let bytes = STANDARD.decode(payload.trim()).ok()?;
        if bytes.is_empty() {
            return None;
        }
        Some(Self { mime_type, bytes })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// A searched place, used to relocate the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceMatch {
    pub coords: Coordinates,
    pub address: String,
}

/// Result of multimodal identification: the landmark and a narration script
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identification {
    pub landmark: Landmark,
    pub script: String,
}

/// An orchestrated operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    NearbySearch,
    TextSearch,
    SubAttractions,
    Narration,
    Identify,
    LocationSearch,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::NearbySearch,
        Capability::TextSearch,
        Capability::SubAttractions,
        Capability::Narration,
        Capability::Identify,
        Capability::LocationSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::NearbySearch => "nearby_search",
            Capability::TextSearch => "text_search",
            Capability::SubAttractions => "sub_attractions",
            Capability::Narration => "narration",
            Capability::Identify => "identify",
            Capability::LocationSearch => "location_search",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

/// A remote service able to answer capability requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Map,
    DomesticLlm,
    Multimodal,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] =
        [ProviderKind::Map, ProviderKind::DomesticLlm, ProviderKind::Multimodal];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Map => "map",
            ProviderKind::DomesticLlm => "domestic_llm",
            ProviderKind::Multimodal => "multimodal",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lng_lat_parse() {
        let c = Coordinates::from_lng_lat("116.397128,39.916527").unwrap();
        assert_eq!(c.longitude, 116.397128);
        assert_eq!(c.latitude, 39.916527);
        assert!(Coordinates::from_lng_lat("116.39").is_none());
        assert!(Coordinates::from_lng_lat("a,b").is_none());
    }

    #[test]
    fn test_formatted_coordinates() {
        let c = Coordinates::new(39.9042, 116.4074);
        assert_eq!(c.formatted(), "39.904200, 116.407400");
        assert_eq!(c.to_lng_lat(), "116.407400,39.904200");
    }

    #[test]
    fn test_image_from_data_url() {
        let img = ImageInput::from_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.bytes, b"hello");
        assert_eq!(img.to_base64(), "aGVsbG8=");

        let bare = ImageInput::from_data_url("aGVsbG8=").unwrap();
        assert_eq!(bare.mime_type, "image/jpeg");

        assert!(ImageInput::from_data_url("data:image/jpeg;base64,%%%").is_none());
    }

    #[test]
    fn test_history_item_serializes_flat() {
        let item = HistoryItem {
            landmark: Landmark::new("m1", "故宫博物院", "皇家宫殿").with_kind("世界遗产"),
            timestamp: 1_700_000_000_000,
            full_text: Some("讲解".to_string()),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["name"], "故宫博物院");
        assert_eq!(json["type"], "世界遗产");
        assert_eq!(json["fullText"], "讲解");
        assert!(json.get("distance").is_none());

        let back: HistoryItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_audio_state_constructors() {
        let s = AudioState::loading("A");
        assert!(s.is_loading && !s.is_playing && !s.is_paused);
        assert!(s.is_active_for("A"));
        assert!(!s.is_active_for("B"));
        assert_eq!(AudioState::idle().playing_item_name, None);
    }
}
