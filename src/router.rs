//! Request routing: validation, model resolution, cache, dispatch.
//!
//! Each route handler delegates here. The router owns the per-request
//! state machine: correlation id and clock, model validation or
//! auto-selection, cache lookup, provider dispatch through the
//! `ProviderId -> client` map, payload shaping and the uniform envelope.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{cache_key, CacheStore};
use crate::config::CacheConfig;
use crate::error::{ProviderError, RouteError};
use crate::providers::{ChatMessage, ProviderRequest, ProviderResult, ProviderSet};
use crate::registry::{ModelDescriptor, ModelRegistry, AUTO_MODEL_KEY};
use crate::selector::{self, Mode};
use crate::stats::GatewayStats;

/// Largest accepted chat message content, in bytes.
const MAX_MESSAGE_BYTES: usize = 32 * 1024;

/// Uniform response wrapper. Exactly one of `payload` and `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub processing_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

/// A finished routing decision, ready to become an HTTP response.
#[derive(Debug, Clone)]
pub struct Routed {
    pub status: StatusCode,
    pub request_id: Uuid,
    pub processing_ms: u64,
    pub body: Value,
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_model")]
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Optional persona injected as a leading system message.
    pub behavior: Option<String>,
    #[serde(default)]
    pub mode: Mode,
}

fn default_model() -> String {
    AUTO_MODEL_KEY.to_string()
}

/// Body of `POST /image`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_style")]
    pub style: String,
}

fn default_size() -> String {
    "1024x1024".to_string()
}

fn default_quality() -> String {
    "standard".to_string()
}

fn default_style() -> String {
    "natural".to_string()
}

/// Body of `POST /search`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    pub max_results: Option<u32>,
    #[serde(default)]
    pub include_domains: Vec<String>,
    #[serde(default)]
    pub exclude_domains: Vec<String>,
}

/// Model key used by the fixed-model routes.
const IMAGE_MODEL_KEY: &str = "imagen-4-premium";
const TRANSCRIBE_MODEL_KEY: &str = "whisper-transcription";
const SEARCH_MODEL_KEY: &str = "tavily-search";

pub struct RequestRouter {
    registry: Arc<ModelRegistry>,
    providers: ProviderSet,
    cache: Arc<CacheStore>,
    stats: Arc<GatewayStats>,
    chat_ttl: Duration,
    search_ttl: Duration,
}

/// Running state for one request: correlation id and clock.
struct RequestContext {
    request_id: Uuid,
    started: Instant,
}

impl RequestContext {
    fn begin() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            started: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

fn status_for(err: &RouteError) -> StatusCode {
    match err {
        RouteError::InvalidModel(_) | RouteError::InvalidParameter { .. } => {
            StatusCode::BAD_REQUEST
        }
        RouteError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        RouteError::Provider(p) if p.is_client_fault() => StatusCode::BAD_REQUEST,
        RouteError::Provider(_) => StatusCode::BAD_GATEWAY,
    }
}

impl RequestRouter {
    pub fn new(
        registry: Arc<ModelRegistry>,
        providers: ProviderSet,
        cache: Arc<CacheStore>,
        stats: Arc<GatewayStats>,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            registry,
            providers,
            cache,
            stats,
            chat_ttl: Duration::from_secs(cache_config.chat_ttl_secs),
            search_ttl: Duration::from_secs(cache_config.search_ttl_secs),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    fn envelope_ok(
        ctx: &RequestContext,
        payload: Value,
        model: Option<String>,
        tokens_used: Option<u32>,
    ) -> ResponseEnvelope {
        ResponseEnvelope {
            success: true,
            payload: Some(payload),
            error: None,
            request_id: ctx.request_id,
            timestamp: Utc::now(),
            processing_ms: ctx.elapsed_ms(),
            model,
            tokens_used,
        }
    }

    fn envelope_err(ctx: &RequestContext, err: &RouteError) -> ResponseEnvelope {
        ResponseEnvelope {
            success: false,
            payload: None,
            error: Some(err.to_string()),
            request_id: ctx.request_id,
            timestamp: Utc::now(),
            processing_ms: ctx.elapsed_ms(),
            model: None,
            tokens_used: None,
        }
    }

    fn routed(ctx: &RequestContext, status: StatusCode, body: Value) -> Routed {
        Routed {
            status,
            request_id: ctx.request_id,
            processing_ms: ctx.elapsed_ms(),
            body,
        }
    }

    fn routed_envelope(ctx: &RequestContext, status: StatusCode, env: ResponseEnvelope) -> Routed {
        Routed {
            status,
            request_id: ctx.request_id,
            processing_ms: env.processing_ms,
            body: serde_json::to_value(env).unwrap_or_else(|_| json!({"success": false})),
        }
    }

    async fn dispatch(
        &self,
        model: &ModelDescriptor,
        request: ProviderRequest,
    ) -> Result<ProviderResult, RouteError> {
        let client =
            self.providers
                .get(model.provider)
                .ok_or_else(|| ProviderError::Unconfigured {
                    provider: model.provider.to_string(),
                })?;
        let result = client
            .invoke(model.upstream_id, request, model.timeout)
            .await;
        if let Err(e) = &result {
            self.stats.record_provider_error();
            warn!(provider = %model.provider, model = model.key, error = %e, "provider call failed");
        }
        Ok(result?)
    }

    /// Write to the cache off the request path. Best effort: the task may
    /// be dropped at process exit and failures are absorbed by the store.
    fn spawn_cache_write(&self, key: String, value: Value, ttl: Duration) {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            cache.set(&key, &value, ttl).await;
        });
    }

    // ---- /chat ----

    pub async fn chat(&self, request: ChatRequest) -> Routed {
        let ctx = RequestContext::begin();
        self.stats.record_chat();
        match self.chat_inner(&ctx, request).await {
            Ok(env) => Self::routed_envelope(&ctx, StatusCode::OK, env),
            Err(err) => {
                let status = status_for(&err);
                let env = Self::envelope_err(&ctx, &err);
                Self::routed_envelope(&ctx, status, env)
            }
        }
    }

    async fn chat_inner(
        &self,
        ctx: &RequestContext,
        request: ChatRequest,
    ) -> Result<ResponseEnvelope, RouteError> {
        let temperature = validate_temperature(request.temperature)?;
        validate_messages(&request.messages)?;

        let model_key = if request.model == AUTO_MODEL_KEY {
            let last = request
                .messages
                .last()
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            selector::select(last, request.mode)
        } else {
            &request.model
        };
        let model = self.registry.resolve(model_key)?;

        let max_tokens = request
            .max_tokens
            .unwrap_or(model.max_output_tokens)
            .min(model.max_output_tokens);

        let mut messages = request.messages;
        if let Some(behavior) = &request.behavior {
            if !behavior.trim().is_empty() {
                messages.insert(0, ChatMessage::system(behavior.clone()));
            }
        }

        let key = cache_key(
            "chat",
            &json!({
                "model": model.key,
                "messages": messages,
                "temperature": temperature,
                "max_tokens": max_tokens,
            }),
        );

        if let Some(payload) = self.cache.get(&key).await {
            info!(request_id = %ctx.request_id, model = model.key, "chat served from cache");
            return Ok(Self::envelope_ok(
                ctx,
                payload,
                Some(model.display_name.to_string()),
                None,
            ));
        }

        let result = self
            .dispatch(
                model,
                ProviderRequest::Chat {
                    messages,
                    temperature,
                    max_tokens,
                },
            )
            .await?;

        let (content, tokens_used) = match result {
            ProviderResult::Chat {
                content,
                total_tokens,
            } => (content, total_tokens),
            other => {
                return Err(unexpected_result(model, &other));
            }
        };

        let payload = json!({
            "content": content,
            "model": model.display_name,
            "provider": model.provider,
            "category": model.cost,
        });
        self.spawn_cache_write(key, payload.clone(), self.chat_ttl);

        info!(
            request_id = %ctx.request_id,
            model = model.key,
            provider = %model.provider,
            duration_ms = ctx.elapsed_ms(),
            "chat completed"
        );
        Ok(Self::envelope_ok(
            ctx,
            payload,
            Some(model.display_name.to_string()),
            tokens_used,
        ))
    }

    // ---- /search ----

    pub async fn search(&self, request: SearchRequest) -> Routed {
        let ctx = RequestContext::begin();
        self.stats.record_search();
        match self.search_inner(&ctx, request).await {
            Ok(env) => Self::routed_envelope(&ctx, StatusCode::OK, env),
            Err(err) => {
                let status = status_for(&err);
                let env = Self::envelope_err(&ctx, &err);
                Self::routed_envelope(&ctx, status, env)
            }
        }
    }

    async fn search_inner(
        &self,
        ctx: &RequestContext,
        request: SearchRequest,
    ) -> Result<ResponseEnvelope, RouteError> {
        if request.query.trim().is_empty() {
            return Err(RouteError::InvalidParameter {
                field: "query".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        let max_results = request.max_results.unwrap_or(10);
        if !(1..=20).contains(&max_results) {
            return Err(RouteError::InvalidParameter {
                field: "maxResults".to_string(),
                message: "must be between 1 and 20".to_string(),
            });
        }

        let model = self.registry.resolve(SEARCH_MODEL_KEY)?;

        let key = cache_key(
            "search",
            &json!({
                "query": request.query,
                "max_results": max_results,
                "include_domains": request.include_domains,
                "exclude_domains": request.exclude_domains,
            }),
        );

        if let Some(payload) = self.cache.get(&key).await {
            info!(request_id = %ctx.request_id, "search served from cache");
            return Ok(Self::envelope_ok(
                ctx,
                payload,
                Some(model.display_name.to_string()),
                None,
            ));
        }

        let result = self
            .dispatch(
                model,
                ProviderRequest::Search {
                    query: request.query,
                    max_results,
                    include_domains: request.include_domains,
                    exclude_domains: request.exclude_domains,
                },
            )
            .await?;

        let (answer, results) = match result {
            ProviderResult::Search { answer, results } => (answer, results),
            other => return Err(unexpected_result(model, &other)),
        };

        let payload = json!({
            "answer": answer,
            "results": results,
            "model": model.display_name,
            "provider": model.provider,
            "category": model.cost,
        });
        self.spawn_cache_write(key, payload.clone(), self.search_ttl);

        info!(
            request_id = %ctx.request_id,
            duration_ms = ctx.elapsed_ms(),
            "search completed"
        );
        Ok(Self::envelope_ok(
            ctx,
            payload,
            Some(model.display_name.to_string()),
            None,
        ))
    }

    // ---- /image ----

    /// Image generation. Success returns the plain `{url, model}` shape;
    /// failures fall back to the envelope.
    pub async fn image(&self, request: ImageRequest) -> Routed {
        let ctx = RequestContext::begin();
        self.stats.record_image();
        match self.image_inner(&ctx, request).await {
            Ok(body) => Self::routed(&ctx, StatusCode::OK, body),
            Err(err) => {
                let status = status_for(&err);
                let env = Self::envelope_err(&ctx, &err);
                Self::routed_envelope(&ctx, status, env)
            }
        }
    }

    async fn image_inner(
        &self,
        ctx: &RequestContext,
        request: ImageRequest,
    ) -> Result<Value, RouteError> {
        if request.prompt.trim().is_empty() {
            return Err(RouteError::InvalidParameter {
                field: "prompt".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        let model = self.registry.resolve(IMAGE_MODEL_KEY)?;
        let result = self
            .dispatch(
                model,
                ProviderRequest::Image {
                    prompt: request.prompt,
                    size: request.size,
                    quality: request.quality,
                    style: request.style,
                },
            )
            .await?;

        let url = match result {
            ProviderResult::Image { url } => url,
            other => return Err(unexpected_result(model, &other)),
        };

        info!(
            request_id = %ctx.request_id,
            duration_ms = ctx.elapsed_ms(),
            "image generated"
        );
        Ok(json!({ "url": url, "model": model.display_name }))
    }

    // ---- /transcribe ----

    /// Audio transcription. Success returns the plain `{text, model}`
    /// shape; failures fall back to the envelope.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: String,
        content_type: String,
    ) -> Routed {
        let ctx = RequestContext::begin();
        self.stats.record_transcribe();
        match self.transcribe_inner(&ctx, audio, filename, content_type).await {
            Ok(body) => Self::routed(&ctx, StatusCode::OK, body),
            Err(err) => {
                let status = status_for(&err);
                let env = Self::envelope_err(&ctx, &err);
                Self::routed_envelope(&ctx, status, env)
            }
        }
    }

    async fn transcribe_inner(
        &self,
        ctx: &RequestContext,
        audio: Vec<u8>,
        filename: String,
        content_type: String,
    ) -> Result<Value, RouteError> {
        if audio.is_empty() {
            return Err(RouteError::InvalidParameter {
                field: "file".to_string(),
                message: "uploaded file is empty".to_string(),
            });
        }

        let model = self.registry.resolve(TRANSCRIBE_MODEL_KEY)?;
        let result = self
            .dispatch(
                model,
                ProviderRequest::Transcribe {
                    audio,
                    filename,
                    content_type,
                    language: "en".to_string(),
                },
            )
            .await?;

        let text = match result {
            ProviderResult::Transcription { text } => text,
            other => return Err(unexpected_result(model, &other)),
        };

        info!(
            request_id = %ctx.request_id,
            duration_ms = ctx.elapsed_ms(),
            "transcription completed"
        );
        Ok(json!({ "text": text, "model": model.display_name }))
    }

    /// Envelope for a request rejected before any routing happens, such as
    /// a rate-limit rejection or an unreadable upload.
    pub fn reject(&self, err: RouteError) -> Routed {
        let ctx = RequestContext::begin();
        if matches!(err, RouteError::RateLimited { .. }) {
            self.stats.record_rate_limited();
        }
        let status = status_for(&err);
        let env = Self::envelope_err(&ctx, &err);
        Self::routed_envelope(&ctx, status, env)
    }
}

fn unexpected_result(model: &ModelDescriptor, result: &ProviderResult) -> RouteError {
    let got = match result {
        ProviderResult::Chat { .. } => "chat completion",
        ProviderResult::Image { .. } => "image generation",
        ProviderResult::Transcription { .. } => "audio transcription",
        ProviderResult::Search { .. } => "web search",
    };
    warn!(model = model.key, got, "provider returned a result of the wrong kind");
    RouteError::Provider(ProviderError::InvalidResponse {
        provider: model.provider.to_string(),
        reason: format!("unexpected {got} result"),
    })
}

fn validate_temperature(value: Option<f32>) -> Result<f32, RouteError> {
    let temperature = value.unwrap_or(0.7);
    if !(0.0..=2.0).contains(&temperature) || temperature.is_nan() {
        return Err(RouteError::InvalidParameter {
            field: "temperature".to_string(),
            message: "must be between 0 and 2".to_string(),
        });
    }
    Ok(temperature)
}

fn validate_messages(messages: &[ChatMessage]) -> Result<(), RouteError> {
    if messages.is_empty() {
        return Err(RouteError::InvalidParameter {
            field: "messages".to_string(),
            message: "must contain at least one message".to_string(),
        });
    }
    for msg in messages {
        if msg.content.len() > MAX_MESSAGE_BYTES {
            return Err(RouteError::InvalidParameter {
                field: "messages".to_string(),
                message: format!("message content exceeds {MAX_MESSAGE_BYTES} bytes"),
            });
        }
    }
    Ok(())
}
