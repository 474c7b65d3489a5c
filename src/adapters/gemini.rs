use super::{ModelClient, ModelRequest};
use crate::config::{ConfigKey, ConfigStore};
use crate::errors::{AppError, AppResult, RemoteFailure};
use crate::sheets::google::check_response;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini `generateContent` with optional inline image. The key is read per call.
pub struct GeminiClient {
    config: Arc<ConfigStore>,
    http: reqwest::Client,
    model: String,
}

impl GeminiClient {
    pub fn new(config: Arc<ConfigStore>, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }
}

fn build_body(request: ModelRequest) -> GenerateRequest {
    let mut parts = vec![Part::Text { text: request.prompt }];
    if let Some(image) = request.image {
        parts.push(Part::Inline {
            inline_data: InlineData {
                mime_type: image.mime_type,
                data: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
            },
        });
    }
    let generation_config = (request.temperature.is_some() || request.max_tokens.is_some()).then(|| GenerationConfig {
        temperature: request.temperature,
        max_output_tokens: request.max_tokens,
    });
    GenerateRequest {
        contents: vec![Content { parts }],
        system_instruction: request.system.map(|text| Content {
            parts: vec![Part::Text { text }],
        }),
        generation_config,
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, request: ModelRequest) -> AppResult<String> {
        let api_key = self.config.require_text(ConfigKey::GeminiApiKey).await?;
        let response = self
            .http
            .post(format!("{}/{}:generateContent", GEMINI_BASE_URL, self.model))
            .header("x-goog-api-key", api_key)
            .json(&build_body(request))
            .send()
            .await
            .map_err(|error| AppError::transport("gemini", error))?;
        let body: GenerateResponse = check_response("gemini", response)
            .await?
            .json()
            .await
            .map_err(|error| AppError::transport("gemini", error))?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AppError::remote("gemini", RemoteFailure::Other, "model returned no text"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::build_body;
    use crate::adapters::ModelRequest;
    use crate::models::ImageUpload;

    #[test]
    fn image_travels_as_inline_base64() {
        let request = ModelRequest::new("describe").with_image(Some(ImageUpload {
            bytes: b"abc".to_vec(),
            mime_type: "image/png".to_string(),
        }));
        let body = serde_json::to_value(build_body(request)).expect("serialize");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["data"], "YWJj");
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn sampling_and_system_are_forwarded() {
        let request = ModelRequest::new("x").with_system("be brief").with_sampling(0.4, 64);
        let body = serde_json::to_value(build_body(request)).expect("serialize");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
    }
}
