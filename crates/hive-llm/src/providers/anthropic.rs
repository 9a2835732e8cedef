use async_trait::async_trait;
use hive_core::Role;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ChatOptions, ChatResponse, Usage};
use crate::error::{LLMError, Result};
use crate::provider::http::{base_headers, build_client, error_for_status, secret_header};
use crate::provider::{LLMProvider, ProviderConfig, ProviderMetadata};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: String,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    config: ProviderConfig,
    http_client: ClientWithMiddleware,
    metadata: ProviderMetadata,
}

impl AnthropicProvider {
    /// Create with custom configuration
    pub fn with_config(mut config: ProviderConfig) -> Result<Self> {
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }
        let metadata = ProviderMetadata {
            id: "anthropic".to_string(),
            name: "Anthropic".to_string(),
            default_model: config.model.clone(),
        };
        let http_client = build_client(&config)?;
        Ok(Self {
            config,
            http_client,
            metadata,
        })
    }

    /// Create a new Anthropic provider with API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(ProviderConfig::new("anthropic", DEFAULT_BASE_URL).with_api_key(api_key))
    }

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = base_headers(&self.config)?;
        headers.insert(
            "anthropic-version",
            reqwest::header::HeaderValue::from_static(API_VERSION),
        );
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| LLMError::Auth("Anthropic requires an API key".to_string()))?;
        headers.insert("x-api-key", secret_header("API key", key)?);
        Ok(headers)
    }
}

/// Build the request body. The Messages API takes the system prompt as a
/// top-level field, so system turns are folded into it.
fn build_request<'a>(
    config: &'a ProviderConfig,
    messages: &'a [ChatMessage],
    options: &'a ChatOptions,
) -> MessagesRequest<'a> {
    let mut system_parts: Vec<&str> = Vec::new();
    if let Some(prompt) = options.system_prompt.as_deref().filter(|p| !p.is_empty()) {
        system_parts.push(prompt);
    }

    let mut wire = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            Role::System => system_parts.push(&message.content),
            Role::User => wire.push(WireMessage {
                role: "user",
                content: &message.content,
            }),
            Role::Assistant => wire.push(WireMessage {
                role: "assistant",
                content: &message.content,
            }),
        }
    }

    MessagesRequest {
        model: options.model.as_deref().unwrap_or(&config.model),
        max_tokens: options.max_tokens.unwrap_or(config.max_tokens),
        messages: wire,
        system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
        temperature: options.temperature,
    }
}

fn parse_response(body: MessagesResponse) -> ChatResponse {
    let content = body
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect::<String>();

    ChatResponse {
        content,
        model: body.model,
        stop_reason: body.stop_reason.unwrap_or_default(),
        usage: Usage {
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
        },
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        &self.metadata.id
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse> {
        let body = build_request(&self.config, messages, options);
        log::debug!(
            "anthropic request: model={} messages={}",
            body.model,
            body.messages.len()
        );

        let response = self
            .http_client
            .post(self.config.endpoint("messages"))
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(response).await?;

        let body: MessagesResponse = response.json().await?;
        Ok(parse_response(body))
    }
}
