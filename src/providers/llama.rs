//! llama.cpp-compatible chat completions client
//!
//! Posts OpenAI-style requests to the configured URL as-is (no path is
//! appended), with `stream: false`. The bearer header is only sent when an
//! API key is configured, since local servers usually run without one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::BackendSettings;
use crate::error::{DeckError, ProviderError, Result};

use super::parse_provider_error;
use super::types::{
    AssistantMessage, ChatMessage, ChatOptions, ModelClient, ToolDefinition,
};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct LlamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<LlamaTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct LlamaTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: LlamaFunctionDef,
}

#[derive(Debug, Serialize)]
struct LlamaFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct LlamaResponse {
    #[serde(default)]
    choices: Vec<LlamaChoice>,
}

#[derive(Debug, Deserialize)]
struct LlamaChoice {
    #[serde(default)]
    message: AssistantMessage,
}

fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<LlamaTool> {
    tools
        .into_iter()
        .map(|t| LlamaTool {
            tool_type: "function",
            function: LlamaFunctionDef {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
            },
        })
        .collect()
}

fn convert_response(body: &str) -> Result<AssistantMessage> {
    let response: LlamaResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Decode(format!("{}: {}", e, preview(body))))?;
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ProviderError::Decode("response contained no choices".to_string()).into())
}

fn preview(body: &str) -> String {
    crate::utils::string::truncate_with_ellipsis(body, 200)
}

// ============================================================================
// Client
// ============================================================================

pub struct LlamaCppClient {
    url: String,
    api_key: String,
    client: Client,
}

impl LlamaCppClient {
    /// Build a client for `backend` with the given request timeout.
    pub fn new(backend: &BackendSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(backend, client))
    }

    /// Build a client around an existing reqwest client.
    pub fn with_client(backend: &BackendSettings, client: Client) -> Self {
        Self {
            url: backend.base_url.clone(),
            api_key: backend.api_key.clone(),
            client,
        }
    }
}

#[async_trait]
impl ModelClient for LlamaCppClient {
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        model: &str,
        options: ChatOptions,
    ) -> Result<AssistantMessage> {
        let request = LlamaRequest {
            model,
            messages: &messages,
            temperature: options.temperature,
            stream: false,
            tools: (!tools.is_empty()).then(|| convert_tools(tools)),
            max_tokens: options.max_tokens,
        };

        debug!(model = %model, messages = messages.len(), "Sending chat completion request");

        let mut builder = self.client.post(&self.url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                DeckError::from(ProviderError::Timeout(e.to_string()))
            } else {
                DeckError::Provider(format!("request to {} failed: {}", self.url, e))
            }
        })?;

        let status = response.status();
        let body = response.text().await?;
        if status.as_u16() >= 400 {
            return Err(parse_provider_error(status.as_u16(), &body).into());
        }

        let message = convert_response(&body)?;
        info!(model = %model, tool_calls = message.tool_calls().len(), "Chat completion received");
        Ok(message)
    }

    fn name(&self) -> &str {
        "llama.cpp"
    }
}
