use super::{ModelClient, ModelRequest};
use crate::config::{ConfigKey, ConfigStore};
use crate::errors::{AppError, AppResult};
use crate::sheets::google::check_response;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible chat completions on Groq. Text only.
pub struct GroqClient {
    config: Arc<ConfigStore>,
    http: reqwest::Client,
    model: String,
}

impl GroqClient {
    pub fn new(config: Arc<ConfigStore>, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            model: DEFAULT_GROQ_MODEL.to_string(),
        }
    }
}

fn build_messages(request: ModelRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: Some(system),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: Some(request.prompt),
    });
    messages
}

#[async_trait]
impl ModelClient for GroqClient {
    fn name(&self) -> &'static str {
        "groq"
    }

    async fn generate(&self, request: ModelRequest) -> AppResult<String> {
        let api_key = self.config.require_text(ConfigKey::GroqApiKey).await?;
        if request.image.is_some() {
            tracing::debug!("groq client ignores image input");
        }
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: build_messages(request),
        };
        let response = self
            .http
            .post(GROQ_CHAT_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| AppError::transport("groq", error))?;
        let reply: ChatResponse = check_response("groq", response)
            .await?
            .json()
            .await
            .map_err(|error| AppError::transport("groq", error))?;

        Ok(reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::{build_messages, GroqClient};
    use crate::adapters::{ModelClient, ModelRequest};
    use crate::config::{ConfigStore, EnvSnapshot};
    use std::sync::Arc;

    #[test]
    fn system_prompt_leads_the_conversation() {
        let messages = build_messages(ModelRequest::new("note").with_system("rewrite"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content.as_deref(), Some("note"));
    }

    #[tokio::test]
    async fn missing_key_is_a_configuration_error() {
        let client = GroqClient::new(Arc::new(ConfigStore::new(EnvSnapshot::default())), reqwest::Client::new());
        let error = client.generate(ModelRequest::new("x")).await.expect_err("no key");
        assert!(error.to_string().contains("GROQ_API_KEY"));
        assert!(!error.to_string().contains("Bearer"));
    }
}
