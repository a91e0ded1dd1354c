//! Client for the Tavily web-search API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::registry::ProviderId;

use super::{
    extract_error_message, map_send_error, ProviderClient, ProviderRequest, ProviderResult,
    SearchResult,
};

pub struct TavilyClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Deserialize)]
struct TavilyHit {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

impl TavilyClient {
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
        include_domains: &[String],
        exclude_domains: &[String],
        timeout: Duration,
    ) -> Result<ProviderResult, ProviderError> {
        let key = self
            .config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .ok_or_else(|| ProviderError::Unconfigured {
                provider: ProviderId::Tavily.to_string(),
            })?;

        let body = json!({
            "query": query,
            "max_results": max_results,
            "include_domains": include_domains,
            "exclude_domains": exclude_domains,
            "include_answer": true,
            "include_raw_content": false,
        });

        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        debug!(query, max_results, "sending web search request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(ProviderId::Tavily, timeout, e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ProviderError::Transport {
            provider: ProviderId::Tavily.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(ProviderError::Upstream {
                provider: ProviderId::Tavily.to_string(),
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }

        let parsed: TavilyResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse {
                provider: ProviderId::Tavily.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ProviderResult::Search {
            answer: parsed.answer,
            results: parsed
                .results
                .into_iter()
                .map(|hit| SearchResult {
                    title: hit.title,
                    url: hit.url,
                    content: hit.content,
                    score: hit.score,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl ProviderClient for TavilyClient {
    fn id(&self) -> ProviderId {
        ProviderId::Tavily
    }

    async fn invoke(
        &self,
        _upstream_model_id: &str,
        request: ProviderRequest,
        timeout: Duration,
    ) -> Result<ProviderResult, ProviderError> {
        match request {
            ProviderRequest::Search {
                query,
                max_results,
                include_domains,
                exclude_domains,
            } => {
                self.search(&query, max_results, &include_domains, &exclude_domains, timeout)
                    .await
            }
            other => Err(ProviderError::Unsupported {
                provider: ProviderId::Tavily.to_string(),
                operation: other.operation(),
            }),
        }
    }
}
