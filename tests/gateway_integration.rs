//! End-to-end tests: boot the gateway on an ephemeral port with stubbed
//! providers and drive it over HTTP.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use modelgate::cache::CacheStore;
use modelgate::config::{CacheConfig, ProviderConfig, RateLimitConfig, GROQ_BASE_URL};
use modelgate::limiter::GatewayLimiters;
use modelgate::providers::{OpenAiLikeClient, ProviderSet};
use modelgate::registry::{ModelRegistry, ProviderId};
use modelgate::router::RequestRouter;
use modelgate::server::{AppState, Gateway};
use modelgate::stats::GatewayStats;
use modelgate::testing::StubProviderClient;

async fn spawn_gateway(providers: ProviderSet, limits: RateLimitConfig) -> SocketAddr {
    let cache_config = CacheConfig {
        url: None,
        chat_ttl_secs: 3600,
        search_ttl_secs: 1800,
    };
    let router = Arc::new(RequestRouter::new(
        Arc::new(ModelRegistry::builtin()),
        providers,
        Arc::new(CacheStore::connect(None).await),
        Arc::new(GatewayStats::new()),
        &cache_config,
    ));
    let limiters = Arc::new(GatewayLimiters::new(&limits));

    let gateway = Gateway::bind(
        "127.0.0.1:0".parse().unwrap(),
        AppState { router, limiters },
    )
    .await
    .expect("bind test gateway");
    let addr = gateway.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = gateway.serve().await;
    });
    addr
}

fn chat_stub(content: &str) -> (ProviderSet, Arc<AtomicU32>) {
    let stub = StubProviderClient::chat_stub(ProviderId::OpenRouter, content);
    let calls = stub.calls_handle();
    (ProviderSet::from_clients(vec![Arc::new(stub)]), calls)
}

fn chat_body(model: &str, content: &str) -> Value {
    json!({
        "messages": [{"role": "user", "content": content}],
        "model": model,
    })
}

#[tokio::test]
async fn chat_returns_envelope_with_headers() {
    let (providers, _) = chat_stub("hello from the stub");
    let addr = spawn_gateway(providers, RateLimitConfig::default()).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/chat"))
        .json(&chat_body("gemini-2-5-pro-free", "hi"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-processing-time-ms"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["payload"]["content"], "hello from the stub");
    assert_eq!(body["payload"]["model"], "Gemini 2.5 Pro");
    assert_eq!(body["payload"]["provider"], "openrouter");
    assert_eq!(body["model"], "Gemini 2.5 Pro");
    assert_eq!(body["tokens_used"], 42);
    assert!(body.get("error").is_none());
    assert!(body["request_id"].as_str().is_some());
}

#[tokio::test]
async fn identical_chat_is_served_from_cache() {
    let (providers, calls) = chat_stub("cache me");
    let addr = spawn_gateway(providers, RateLimitConfig::default()).await;

    let client = reqwest::Client::new();
    let body = chat_body("gemini-2-5-pro-free", "exact same question");

    let first: Value = client
        .post(format!("http://{addr}/chat"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["success"], true);

    // Cache writes are spawned off the request path.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second: Value = client
        .post(format!("http://{addr}/chat"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["success"], true);
    assert_eq!(second["payload"]["content"], "cache me");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "provider called twice");
}

#[tokio::test]
async fn chat_rate_limit_boundary() {
    let (providers, calls) = chat_stub("ok");
    let limits = RateLimitConfig {
        chat_per_minute: 3,
        ..Default::default()
    };
    let addr = spawn_gateway(providers, limits).await;

    let client = reqwest::Client::new();
    for i in 0..3 {
        let response = client
            .post(format!("http://{addr}/chat"))
            .json(&chat_body("gemini-2-5-pro-free", &format!("q{i}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "request {i} should pass");
    }

    let response = client
        .post(format!("http://{addr}/chat"))
        .json(&chat_body("gemini-2-5-pro-free", "one too many"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Rate limit"));
    // The rejected request must not reach the provider.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unknown_model_is_a_400_envelope() {
    let (providers, calls) = chat_stub("unused");
    let addr = spawn_gateway(providers, RateLimitConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/chat"))
        .json(&chat_body("gpt-99", "hi"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("gpt-99"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unconfigured_provider_short_circuits() {
    // A real client with no API key: the call must fail before any network
    // traffic and surface as a 502 envelope.
    let client = OpenAiLikeClient::new(
        ProviderId::OpenRouter,
        ProviderConfig {
            base_url: "http://127.0.0.1:9/unreachable".to_string(),
            api_key: None,
            extra_headers: Vec::new(),
        },
        reqwest::Client::new(),
    );
    let providers = ProviderSet::from_clients(vec![Arc::new(client)]);
    let addr = spawn_gateway(providers, RateLimitConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/chat"))
        .json(&chat_body("gemini-2-5-pro-free", "hi"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("not configured"));
}

#[tokio::test]
async fn search_envelope_and_cache() {
    let stub = StubProviderClient::search_stub(ProviderId::Tavily, "Rust is fast.");
    let calls = stub.calls_handle();
    let providers = ProviderSet::from_clients(vec![Arc::new(stub)]);
    let addr = spawn_gateway(providers, RateLimitConfig::default()).await;

    let client = reqwest::Client::new();
    let body = json!({"query": "why is rust fast", "maxResults": 5});

    let first: Value = client
        .post(format!("http://{addr}/search"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["success"], true);
    assert_eq!(first["payload"]["answer"], "Rust is fast.");
    assert_eq!(first["payload"]["results"][0]["title"], "Stub result");

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second: Value = client
        .post(format!("http://{addr}/search"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["success"], true);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "search not cached");
}

#[tokio::test]
async fn image_returns_plain_shape() {
    let stub = StubProviderClient::image_stub(ProviderId::A4f, "https://cdn.example/out.png");
    let providers = ProviderSet::from_clients(vec![Arc::new(stub)]);
    let addr = spawn_gateway(providers, RateLimitConfig::default()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/image"))
        .json(&json!({"prompt": "a lighthouse at dusk"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["url"], "https://cdn.example/out.png");
    assert_eq!(body["model"], "Imagen 4");
    assert!(body.get("success").is_none());
}

#[tokio::test]
async fn transcribe_multipart_round_trip() {
    let stub = StubProviderClient::transcription_stub(ProviderId::Groq, "hello world");
    let providers = ProviderSet::from_clients(vec![Arc::new(stub)]);
    let addr = spawn_gateway(providers, RateLimitConfig::default()).await;

    let part = reqwest::multipart::Part::bytes(vec![1u8, 2, 3, 4])
        .file_name("clip.wav")
        .mime_str("audio/wav")
        .unwrap();
    let form = reqwest::multipart::Form::new().part("file", part);

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/transcribe"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["text"], "hello world");
    assert_eq!(body["model"], "Whisper Large V3");
}

#[tokio::test]
async fn transcribe_without_file_field_is_rejected() {
    let stub = StubProviderClient::transcription_stub(ProviderId::Groq, "unused");
    let providers = ProviderSet::from_clients(vec![Arc::new(stub)]);
    let addr = spawn_gateway(providers, RateLimitConfig::default()).await;

    let form = reqwest::multipart::Form::new().text("note", "no file here");
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/transcribe"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn models_lists_full_catalog() {
    let (providers, _) = chat_stub("unused");
    let addr = spawn_gateway(providers, RateLimitConfig::default()).await;

    let body: Value = reqwest::Client::new()
        .get(format!("http://{addr}/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 14);
    assert!(models
        .iter()
        .any(|m| m["key"] == "whisper-transcription" && m["provider"] == "groq"));
}

#[tokio::test]
async fn health_reports_registry_and_cache() {
    let (providers, _) = chat_stub("unused");
    let addr = spawn_gateway(providers, RateLimitConfig::default()).await;

    let body: Value = reqwest::Client::new()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["models_available"], 14);
    // Test gateway runs on the degraded in-process cache.
    assert_eq!(body["cache_available"], false);
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn stats_counts_requests_and_rejections() {
    let (providers, _) = chat_stub("ok");
    let limits = RateLimitConfig {
        chat_per_minute: 1,
        ..Default::default()
    };
    let addr = spawn_gateway(providers, limits).await;

    let client = reqwest::Client::new();
    let body = chat_body("gemini-2-5-pro-free", "hi");
    client
        .post(format!("http://{addr}/chat"))
        .json(&body)
        .send()
        .await
        .unwrap();
    client
        .post(format!("http://{addr}/chat"))
        .json(&body)
        .send()
        .await
        .unwrap();

    let stats: Value = client
        .get(format!("http://{addr}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["chat_requests"], 1);
    assert_eq!(stats["rate_limited"], 1);
    assert_eq!(stats["total_requests"], 1);
    assert!(stats["uptime_secs"].as_u64().is_some());
}

#[tokio::test]
async fn groq_base_url_points_at_openai_compatible_path() {
    // Groq's OpenAI-compatible surface lives under /openai/v1.
    assert_eq!(GROQ_BASE_URL, "https://api.groq.com/openai/v1");
}
