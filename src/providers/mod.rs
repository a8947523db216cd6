//! Providers module - model backend clients
//!
//! The worker talks to the backend only through [`ModelClient`]. Clients are
//! built by a [`ModelClientFactory`] from the current [`BackendSettings`], so a
//! settings edit (new URL or key) yields a new client on the next task.

pub mod llama;
pub mod types;

pub use llama::LlamaCppClient;
pub use types::{
    AssistantMessage, ChatMessage, ChatOptions, ModelClient, RawFunctionCall, RawToolCall,
    ToolDefinition, WireFunctionCall, WireToolCall,
};

use std::sync::Arc;
use std::time::Duration;

use crate::config::BackendSettings;
use crate::error::{ProviderError, Result};

/// Builds model clients from backend settings.
pub trait ModelClientFactory: Send + Sync {
    fn create(&self, backend: &BackendSettings) -> Result<Arc<dyn ModelClient>>;
}

/// Factory for [`LlamaCppClient`].
pub struct LlamaCppFactory {
    timeout: Duration,
}

impl LlamaCppFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LlamaCppFactory {
    fn default() -> Self {
        Self::new(llama::DEFAULT_TIMEOUT)
    }
}

impl ModelClientFactory for LlamaCppFactory {
    fn create(&self, backend: &BackendSettings) -> Result<Arc<dyn ModelClient>> {
        Ok(Arc::new(LlamaCppClient::new(backend, self.timeout)?))
    }
}

/// Factory that always hands out the same client. Useful for tests and embedding.
pub struct FixedClientFactory(pub Arc<dyn ModelClient>);

impl ModelClientFactory for FixedClientFactory {
    fn create(&self, _backend: &BackendSettings) -> Result<Arc<dyn ModelClient>> {
        Ok(Arc::clone(&self.0))
    }
}

/// Map an HTTP status and response body to a [`ProviderError`].
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body.to_string()),
        404 => ProviderError::NotFound(body.to_string()),
        408 => ProviderError::Timeout(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 | 413 | 422 => ProviderError::InvalidRequest(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}
