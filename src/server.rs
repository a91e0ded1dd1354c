//! HTTP surface of the gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, State};
use axum::http::{header::HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{RouteError, ServerError};
use crate::limiter::GatewayLimiters;
use crate::providers::MAX_TRANSCRIPTION_BYTES;
use crate::router::{ChatRequest, ImageRequest, RequestRouter, Routed, SearchRequest};

/// Body limit leaves headroom over the 25 MiB transcription ceiling for
/// multipart framing.
const BODY_LIMIT_BYTES: usize = MAX_TRANSCRIPTION_BYTES + 1024 * 1024;

static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
static PROCESSING_TIME_HEADER: HeaderName = HeaderName::from_static("x-processing-time-ms");

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RequestRouter>,
    pub limiters: Arc<GatewayLimiters>,
}

impl IntoResponse for Routed {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.request_id.to_string()) {
            headers.insert(REQUEST_ID_HEADER.clone(), value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.processing_ms.to_string()) {
            headers.insert(PROCESSING_TIME_HEADER.clone(), value);
        }
        response
    }
}

/// Build the axum application over shared state.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/image", post(image_handler))
        .route("/transcribe", post(transcribe_handler))
        .route("/search", post(search_handler))
        .route("/models", get(models_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        // The original deployment served a browser client from any origin.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<ChatRequest>,
) -> Routed {
    if let Err(err) = state.limiters.chat.check(addr.ip()) {
        return state.router.reject(err);
    }
    state.router.chat(request).await
}

async fn image_handler(
    State(state): State<AppState>,
    Json(request): Json<ImageRequest>,
) -> Routed {
    state.router.image(request).await
}

async fn search_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<SearchRequest>,
) -> Routed {
    if let Err(err) = state.limiters.search.check(addr.ip()) {
        return state.router.reject(err);
    }
    state.router.search(request).await
}

async fn transcribe_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Routed {
    // Pull the first "file" field out of the multipart body.
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field
                    .file_name()
                    .unwrap_or("audio.wav")
                    .to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let audio = match field.bytes().await {
                    Ok(bytes) => bytes.to_vec(),
                    Err(e) => {
                        return state.router.reject(RouteError::InvalidParameter {
                            field: "file".to_string(),
                            message: format!("failed to read upload: {e}"),
                        });
                    }
                };
                return state.router.transcribe(audio, filename, content_type).await;
            }
            Ok(Some(_)) => continue,
            Ok(None) => {
                return state.router.reject(RouteError::InvalidParameter {
                    field: "file".to_string(),
                    message: "multipart body has no 'file' field".to_string(),
                });
            }
            Err(e) => {
                return state.router.reject(RouteError::InvalidParameter {
                    field: "file".to_string(),
                    message: format!("invalid multipart body: {e}"),
                });
            }
        }
    }
}

async fn models_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "models": state.router.registry().list_all() })),
    )
        .into_response()
}

async fn stats_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    if let Err(err) = state.limiters.stats.check(addr.ip()) {
        return state.router.reject(err).into_response();
    }
    let (hits, misses) = state.router.cache().counters();
    let snapshot = state.router.stats().snapshot(hits, misses);
    (StatusCode::OK, Json(snapshot)).into_response()
}

async fn health_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": Utc::now(),
            "models_available": state.router.registry().len(),
            "cache_available": state.router.cache().external_available(),
        })),
    )
        .into_response()
}

/// A bound but not yet running gateway.
pub struct Gateway {
    listener: tokio::net::TcpListener,
    app: Router,
}

impl Gateway {
    /// Bind the listener. Port 0 picks an ephemeral port (used by tests).
    pub async fn bind(addr: SocketAddr, state: AppState) -> Result<Self, ServerError> {
        let listener =
            tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| ServerError::BindFailed {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(Self {
            listener,
            app: build_app(state),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::BindFailed {
                addr: "local".to_string(),
                reason: e.to_string(),
            })
    }

    /// Run until the shutdown future resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "gateway listening");
        }
        axum::serve(
            self.listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
    }

    /// Run forever.
    pub async fn serve(self) -> std::io::Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }
}
