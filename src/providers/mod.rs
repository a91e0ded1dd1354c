//! Upstream provider clients.
//!
//! Each provider implements [`ProviderClient`] over a normalized
//! request/result pair, so the router dispatches through a
//! `ProviderId -> Arc<dyn ProviderClient>` map and never branches on
//! provider names.

mod openai_like;
mod tavily;

pub use openai_like::{OpenAiLikeClient, MAX_TRANSCRIPTION_BYTES};
pub use tavily::TavilyClient;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProvidersConfig;
use crate::error::ProviderError;
use crate::registry::ProviderId;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Normalized outbound request, independent of provider wire formats.
#[derive(Debug, Clone)]
pub enum ProviderRequest {
    Chat {
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: u32,
    },
    Image {
        prompt: String,
        size: String,
        quality: String,
        style: String,
    },
    Transcribe {
        audio: Vec<u8>,
        filename: String,
        content_type: String,
        language: String,
    },
    Search {
        query: String,
        max_results: u32,
        include_domains: Vec<String>,
        exclude_domains: Vec<String>,
    },
}

impl ProviderRequest {
    /// Human name of the operation, used in errors and logs.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat completion",
            Self::Image { .. } => "image generation",
            Self::Transcribe { .. } => "audio transcription",
            Self::Search { .. } => "web search",
        }
    }
}

/// One search hit in a normalized search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

/// Normalized provider result, shaped by the router into the response
/// payload.
#[derive(Debug, Clone)]
pub enum ProviderResult {
    Chat {
        content: String,
        total_tokens: Option<u32>,
    },
    Image {
        url: String,
    },
    Transcription {
        text: String,
    },
    Search {
        answer: Option<String>,
        results: Vec<SearchResult>,
    },
}

/// A client for one upstream provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Perform one upstream call. `timeout` bounds the whole request.
    async fn invoke(
        &self,
        upstream_model_id: &str,
        request: ProviderRequest,
        timeout: Duration,
    ) -> Result<ProviderResult, ProviderError>;
}

/// The full set of provider clients, keyed by provider id.
#[derive(Clone)]
pub struct ProviderSet {
    clients: HashMap<ProviderId, Arc<dyn ProviderClient>>,
}

impl ProviderSet {
    /// Build the production client set from configuration.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let http = reqwest::Client::new();
        let mut clients: HashMap<ProviderId, Arc<dyn ProviderClient>> = HashMap::new();
        clients.insert(
            ProviderId::OpenRouter,
            Arc::new(OpenAiLikeClient::new(
                ProviderId::OpenRouter,
                config.openrouter.clone(),
                http.clone(),
            )),
        );
        clients.insert(
            ProviderId::A4f,
            Arc::new(OpenAiLikeClient::new(
                ProviderId::A4f,
                config.a4f.clone(),
                http.clone(),
            )),
        );
        clients.insert(
            ProviderId::Groq,
            Arc::new(OpenAiLikeClient::new(
                ProviderId::Groq,
                config.groq.clone(),
                http.clone(),
            )),
        );
        clients.insert(
            ProviderId::Tavily,
            Arc::new(TavilyClient::new(config.tavily.clone(), http)),
        );
        Self { clients }
    }

    /// Build a set from explicit clients. Used by tests to inject stubs.
    pub fn from_clients(clients: Vec<Arc<dyn ProviderClient>>) -> Self {
        Self {
            clients: clients.into_iter().map(|c| (c.id(), c)).collect(),
        }
    }

    pub fn get(&self, id: ProviderId) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&id).cloned()
    }
}

/// Map a reqwest send failure to a provider error.
pub(crate) fn map_send_error(
    provider: ProviderId,
    timeout: Duration,
    err: reqwest::Error,
) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            timeout,
        }
    } else {
        ProviderError::Transport {
            provider: provider.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Pull a human-readable message out of an upstream error body.
///
/// Understands `{"error": {"message": ...}}` (OpenAI-style) and
/// `{"detail": ...}` (FastAPI-style); falls back to the truncated raw body.
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value["error"]["message"].as_str() {
            return msg.to_string();
        }
        if let Some(msg) = value["detail"].as_str() {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.len() > 200 {
        // Back off to a char boundary so multibyte bodies can't split.
        let mut end = 200;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}
