//! Gemini `generateContent` client (multimodal LLM)
//!
//! Supports inline images and Google Maps grounding around a position.
//! Grounding chunk titles are returned alongside any text.

use crate::services::providers::{
    GenerateRequest, GenerateResponse, MultimodalProvider, ProviderError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    InlineData(InlineData),
    Text(&'a str),
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReply {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ReplyContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct ReplyContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<ChunkSource>,
    maps: Option<ChunkSource>,
}

#[derive(Debug, Deserialize)]
struct ChunkSource {
    title: Option<String>,
}

impl GroundingChunk {
    fn title(self) -> Option<String> {
        self.web
            .and_then(|s| s.title)
            .or_else(|| self.maps.and_then(|s| s.title))
            .filter(|t| !t.trim().is_empty())
    }
}

pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
            model: model.to_string(),
        })
    }

    fn body<'a>(request: &'a GenerateRequest) -> GenerateBody<'a> {
        let mut parts = Vec::with_capacity(2);
        if let Some(image) = &request.image {
            parts.push(Part::InlineData(InlineData {
                mime_type: image.mime_type.clone(),
                data: image.to_base64(),
            }));
        }
        parts.push(Part::Text(&request.prompt));

        let (tools, tool_config) = match request.grounding {
            Some(at) => (
                Some(json!([{ "googleMaps": {} }])),
                Some(json!({
                    "retrievalConfig": {
                        "latLng": { "latitude": at.latitude, "longitude": at.longitude }
                    }
                })),
            ),
            None => (None, None),
        };

        GenerateBody { contents: [Content { parts }], tools, tool_config }
    }
}

#[async_trait]
impl MultimodalProvider for GeminiClient {
    async fn generate(
        &self,
        api_key: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError> {
        debug!(
            model = %self.model,
            has_image = request.image.is_some(),
            grounded = request.grounding.is_some(),
            "gemini_request"
        );
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&Self::body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let reply: GenerateReply =
            response.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let Some(candidate) = reply.candidates.into_iter().next() else {
            return Err(ProviderError::Empty);
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        let grounding_titles = candidate
            .grounding_metadata
            .map(|g| g.grounding_chunks.into_iter().filter_map(GroundingChunk::title).collect())
            .unwrap_or_default();

        Ok(GenerateResponse {
            text: (!text.is_empty()).then_some(text),
            grounding_titles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Coordinates, ImageInput};
    use mockito::Matcher;

    const PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    fn client(server: &mockito::ServerGuard) -> GeminiClient {
        GeminiClient::new(&server.url(), "gemini-2.5-flash", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_body_with_image_and_grounding() {
        let request = GenerateRequest {
            prompt: "Identify".to_string(),
            image: Some(ImageInput::jpeg(b"hello".to_vec())),
            grounding: Some(Coordinates::new(39.9, 116.4)),
        };
        let body = serde_json::to_value(GeminiClient::body(&request)).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "aGVsbG8=");
        assert_eq!(parts[1]["text"], "Identify");
        assert!(body["tools"][0].get("googleMaps").is_some());
        assert_eq!(body["toolConfig"]["retrievalConfig"]["latLng"]["latitude"], 39.9);
    }

    #[test]
    fn test_text_only_body_has_no_tools() {
        let body = serde_json::to_value(GeminiClient::body(&GenerateRequest::text("hi"))).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("toolConfig").is_none());
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grounding_titles() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "g-key")
            .match_body(Matcher::Regex("googleMaps".into()))
            .with_body(
                r#"{"candidates":[{"content":{"parts":[{"text":"附近有"},{"text":"两个景点"}]},
                    "groundingMetadata":{"groundingChunks":[
                        {"maps":{"title":"故宫博物院","uri":"x"}},
                        {"web":{"title":"景山公园"}},
                        {"web":{}}
                    ]}}]}"#,
            )
            .create_async()
            .await;

        let request = GenerateRequest {
            prompt: "Find attractions".to_string(),
            image: None,
            grounding: Some(Coordinates::new(39.9, 116.4)),
        };
        let response = client(&server).generate("g-key", &request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(response.text.as_deref(), Some("附近有两个景点"));
        assert_eq!(response.grounding_titles, vec!["故宫博物院", "景山公园"]);
    }

    #[tokio::test]
    async fn test_no_candidates_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_body(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .create_async()
            .await;

        let err = client(&server).generate("k", &GenerateRequest::text("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Empty));
    }
}
