//! Provider adapter abstraction.
//!
//! The pipeline depends only on this capability; concrete vendor clients
//! (HTTP/RPC, auth, retries) live outside the crate and implement
//! [`ProviderAdapter`] for their wire protocol.

use crate::error::ProviderError;
use crate::payload::SanitizedPayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A completion returned by a provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Completion text
    pub content: String,
    /// Model that produced the completion, when reported
    pub model: Option<String>,
    /// Provider-specific response metadata (token counts, request ids, ...)
    pub metadata: HashMap<String, String>,
}

impl ProviderResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
            metadata: HashMap::new(),
        }
    }
}

/// Capability to forward a sanitized payload to an LLM provider
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Send the payload and return the provider's response.
    async fn send(&self, payload: &SanitizedPayload) -> Result<ProviderResponse, ProviderError>;
}
