use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ChatOptions, ChatResponse, Usage};
use crate::error::{LLMError, Result};
use crate::provider::http::{base_headers, build_client, error_for_status, secret_header};
use crate::provider::{LLMProvider, ProviderConfig, ProviderMetadata};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// OpenRouter provider (OpenAI-compatible chat completions)
pub struct OpenRouterProvider {
    config: ProviderConfig,
    http_client: ClientWithMiddleware,
    metadata: ProviderMetadata,
}

impl OpenRouterProvider {
    /// Create with custom configuration
    pub fn with_config(mut config: ProviderConfig) -> Result<Self> {
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }
        let metadata = ProviderMetadata {
            id: "openrouter".to_string(),
            name: "OpenRouter".to_string(),
            default_model: config.model.clone(),
        };
        let http_client = build_client(&config)?;
        Ok(Self {
            config,
            http_client,
            metadata,
        })
    }

    /// Create a new OpenRouter provider with API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(ProviderConfig::new("openrouter", DEFAULT_BASE_URL).with_api_key(api_key))
    }

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = base_headers(&self.config)?;
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| LLMError::Auth("OpenRouter requires an API key".to_string()))?;
        headers.insert(
            reqwest::header::AUTHORIZATION,
            secret_header("bearer token", &format!("Bearer {}", key))?,
        );
        Ok(headers)
    }
}

/// Build the request body; the system prompt travels as a leading system turn
fn build_request<'a>(
    config: &'a ProviderConfig,
    messages: &'a [ChatMessage],
    options: &'a ChatOptions,
) -> CompletionRequest<'a> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = options.system_prompt.as_deref().filter(|p| !p.is_empty()) {
        wire.push(WireMessage {
            role: "system",
            content: prompt,
        });
    }
    wire.extend(messages.iter().map(|m| WireMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));

    CompletionRequest {
        model: options.model.as_deref().unwrap_or(&config.model),
        max_tokens: options.max_tokens.unwrap_or(config.max_tokens),
        messages: wire,
        temperature: options.temperature,
    }
}

fn parse_response(body: CompletionResponse) -> ChatResponse {
    let (content, stop_reason) = body
        .choices
        .into_iter()
        .next()
        .map(|choice| {
            (
                choice.message.content.unwrap_or_default(),
                choice.finish_reason.unwrap_or_default(),
            )
        })
        .unwrap_or_default();

    ChatResponse {
        content,
        model: body.model,
        stop_reason,
        usage: Usage {
            input_tokens: body.usage.prompt_tokens,
            output_tokens: body.usage.completion_tokens,
        },
    }
}

#[async_trait]
impl LLMProvider for OpenRouterProvider {
    fn provider_id(&self) -> &str {
        &self.metadata.id
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
        let body = build_request(&self.config, messages, options);
        log::debug!(
            "openrouter request: model={} messages={}",
            body.model,
            body.messages.len()
        );

        let response = self
            .http_client
            .post(self.config.endpoint("chat/completions"))
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(response).await?;

        let body: CompletionResponse = response.json().await?;
        Ok(parse_response(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_prepends_system_prompt() {
        let config = ProviderConfig::new("openrouter", DEFAULT_BASE_URL).with_model(DEFAULT_MODEL);
        let messages = vec![ChatMessage::user("hi")];
        let options = ChatOptions::default().with_system_prompt("be brief");

        let body = serde_json::to_value(build_request(&config, &messages, &options)).unwrap();

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["model"], DEFAULT_MODEL);
    }

    #[test]
    fn test_parse_response_maps_usage() {
        let raw = json!({
            "model": "anthropic/claude-sonnet-4",
            "choices": [{"message": {"role": "assistant", "content": "hey"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 2}
        });
        let parsed = parse_response(serde_json::from_value(raw).unwrap());

        assert_eq!(parsed.content, "hey");
        assert_eq!(parsed.stop_reason, "stop");
        assert_eq!(parsed.usage.input_tokens, 7);
        assert_eq!(parsed.usage.output_tokens, 2);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let parsed = parse_response(serde_json::from_value(json!({"model": "m"})).unwrap());
        assert!(parsed.content.is_empty());
    }
}
