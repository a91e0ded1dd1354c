//! Test doubles shared by unit and integration tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::providers::{ProviderClient, ProviderRequest, ProviderResult, SearchResult};
use crate::registry::ProviderId;

/// Canned behavior for a stubbed provider.
enum StubBehavior {
    Chat(String),
    Image(String),
    Transcription(String),
    Search { answer: String },
    Fail,
}

/// Provider client that returns canned results and counts invocations.
pub struct StubProviderClient {
    id: ProviderId,
    behavior: StubBehavior,
    calls: Arc<AtomicU32>,
}

impl StubProviderClient {
    pub fn chat_stub(id: ProviderId, content: &str) -> Self {
        Self::new(id, StubBehavior::Chat(content.to_string()))
    }

    pub fn image_stub(id: ProviderId, url: &str) -> Self {
        Self::new(id, StubBehavior::Image(url.to_string()))
    }

    pub fn transcription_stub(id: ProviderId, text: &str) -> Self {
        Self::new(id, StubBehavior::Transcription(text.to_string()))
    }

    pub fn search_stub(id: ProviderId, answer: &str) -> Self {
        Self::new(
            id,
            StubBehavior::Search {
                answer: answer.to_string(),
            },
        )
    }

    /// Stub whose every call fails with an upstream 503.
    pub fn failing_stub(id: ProviderId) -> Self {
        Self::new(id, StubBehavior::Fail)
    }

    fn new(id: ProviderId, behavior: StubBehavior) -> Self {
        Self {
            id,
            behavior,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Shared handle to the invocation counter.
    pub fn calls_handle(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ProviderClient for StubProviderClient {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn invoke(
        &self,
        _upstream_model_id: &str,
        _request: ProviderRequest,
        _timeout: Duration,
    ) -> Result<ProviderResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            StubBehavior::Chat(content) => Ok(ProviderResult::Chat {
                content: content.clone(),
                total_tokens: Some(42),
            }),
            StubBehavior::Image(url) => Ok(ProviderResult::Image { url: url.clone() }),
            StubBehavior::Transcription(text) => {
                Ok(ProviderResult::Transcription { text: text.clone() })
            }
            StubBehavior::Search { answer } => Ok(ProviderResult::Search {
                answer: Some(answer.clone()),
                results: vec![SearchResult {
                    title: "Stub result".to_string(),
                    url: "https://example.com/".to_string(),
                    content: "stubbed content".to_string(),
                    score: 0.99,
                }],
            }),
            StubBehavior::Fail => Err(ProviderError::Upstream {
                provider: self.id.to_string(),
                status: 503,
                message: "stubbed upstream failure".to_string(),
            }),
        }
    }
}
