//! Provider interfaces
//!
//! Each provider is stateless from the orchestrator's point of view: it is
//! handed credentials and a request and either answers or fails. Free-text
//! LLM output is turned into typed values here (see [`DomesticLlm`] and
//! [`MultimodalLlm`]) so the orchestrator never parses prose.

use crate::domain::types::{Coordinates, Datum, ImageInput, ProviderKind};
use crate::infra::credentials::MapCredentials;
use crate::io::json_extract;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

/// Why a provider could not produce a usable result.
///
/// The orchestrator treats every variant the same way: log and move on.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} credentials missing")]
    CredentialMissing(ProviderKind),
    #[error("map SDK unavailable: {0}")]
    SdkUnavailable(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider rejected request: {0}")]
    Api(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("empty response")]
    Empty,
}

impl ProviderError {
    /// Missing credentials are a skip, not a failed attempt
    pub fn is_skip(&self) -> bool {
        matches!(self, ProviderError::CredentialMissing(_))
    }
}

/// A map point of interest as the map provider reports it
#[derive(Debug, Clone, PartialEq)]
pub struct Poi {
    pub id: String,
    pub name: String,
    /// Semicolon-delimited category path, most general first
    pub kind: String,
    pub distance_m: Option<u32>,
    pub address: Option<String>,
    pub location: Option<Coordinates>,
}

impl Poi {
    /// First segment of the category path
    pub fn primary_kind(&self) -> &str {
        self.kind.split(';').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    pub center: Coordinates,
    pub radius_m: u32,
    /// `|`-separated category filter
    pub types: String,
    pub page_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReverseGeocode {
    pub formatted_address: Option<String>,
    pub nearby_poi_names: Vec<String>,
}

/// Map/places provider, obtained through a [`MapSdk`] load
#[async_trait]
pub trait MapProvider: Send + Sync {
    async fn nearby(&self, query: &NearbyQuery) -> Result<Vec<Poi>, ProviderError>;

    async fn keyword_search(&self, keywords: &str, page_size: u32) -> Result<Vec<Poi>, ProviderError>;

    async fn reverse_geocode(&self, at: Coordinates) -> Result<ReverseGeocode, ProviderError>;

    /// Convert a position into the provider's datum
    async fn convert(&self, at: Coordinates, from: Datum) -> Result<Coordinates, ProviderError>;

    /// Provider-side geolocation of the caller
    async fn locate(&self) -> Result<Coordinates, ProviderError>;
}

/// Produces a ready map provider from credentials
#[async_trait]
pub trait MapSdk: Send + Sync {
    async fn load(&self, credentials: &MapCredentials) -> Result<Arc<dyn MapProvider>, ProviderError>;
}

/// Chat-completion LLM
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(
        &self,
        api_key: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub image: Option<ImageInput>,
    /// Ask for location-grounded search around this point
    pub grounding: Option<Coordinates>,
}

impl GenerateRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), image: None, grounding: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub text: Option<String>,
    /// Titles of grounding references, in response order
    pub grounding_titles: Vec<String>,
}

/// Multimodal LLM (text, image, grounded search)
#[async_trait]
pub trait MultimodalProvider: Send + Sync {
    async fn generate(
        &self,
        api_key: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError>;
}

fn non_empty_text(text: String) -> Result<String, ProviderError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(ProviderError::Empty)
    } else {
        Ok(trimmed.to_string())
    }
}

fn parse_array<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, ProviderError> {
    json_extract::array::<T>(text)
        .ok_or_else(|| ProviderError::Malformed("no JSON array in response".to_string()))
}

fn parse_object<T: DeserializeOwned>(text: &str) -> Result<T, ProviderError> {
    json_extract::object::<T>(text)
        .ok_or_else(|| ProviderError::Malformed("no JSON object in response".to_string()))
}

/// Typed access to the domestic chat LLM
#[derive(Clone)]
pub struct DomesticLlm {
    client: Arc<dyn ChatProvider>,
}

impl DomesticLlm {
    pub fn new(client: Arc<dyn ChatProvider>) -> Self {
        Self { client }
    }

    pub async fn text(&self, key: &str, system: &str, user: &str) -> Result<String, ProviderError> {
        non_empty_text(self.client.complete(key, system, user).await?)
    }

    pub async fn json_array<T: DeserializeOwned>(
        &self,
        key: &str,
        system: &str,
        user: &str,
    ) -> Result<Vec<T>, ProviderError> {
        parse_array(&self.text(key, system, user).await?)
    }

    pub async fn json_object<T: DeserializeOwned>(
        &self,
        key: &str,
        system: &str,
        user: &str,
    ) -> Result<T, ProviderError> {
        parse_object(&self.text(key, system, user).await?)
    }
}

/// Typed access to the multimodal LLM
#[derive(Clone)]
pub struct MultimodalLlm {
    client: Arc<dyn MultimodalProvider>,
}

impl MultimodalLlm {
    pub fn new(client: Arc<dyn MultimodalProvider>) -> Self {
        Self { client }
    }

    pub async fn text(&self, key: &str, request: &GenerateRequest) -> Result<String, ProviderError> {
        let response = self.client.generate(key, request).await?;
        non_empty_text(response.text.unwrap_or_default())
    }

    /// Grounding reference titles for a location-grounded request
    pub async fn grounded_titles(
        &self,
        key: &str,
        prompt: &str,
        around: Coordinates,
    ) -> Result<Vec<String>, ProviderError> {
        let request =
            GenerateRequest { prompt: prompt.to_string(), image: None, grounding: Some(around) };
        let response = self.client.generate(key, &request).await?;
        Ok(response.grounding_titles)
    }

    pub async fn json_array<T: DeserializeOwned>(
        &self,
        key: &str,
        request: &GenerateRequest,
    ) -> Result<Vec<T>, ProviderError> {
        parse_array(&self.text(key, request).await?)
    }

    pub async fn json_object<T: DeserializeOwned>(
        &self,
        key: &str,
        request: &GenerateRequest,
    ) -> Result<T, ProviderError> {
        parse_object(&self.text(key, request).await?)
    }
}
