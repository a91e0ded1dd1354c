use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use modelgate::cache::CacheStore;
use modelgate::config::Config;
use modelgate::limiter::GatewayLimiters;
use modelgate::providers::ProviderSet;
use modelgate::registry::ModelRegistry;
use modelgate::router::RequestRouter;
use modelgate::server::{AppState, Gateway};
use modelgate::stats::GatewayStats;

#[derive(Parser)]
#[command(name = "modelgate", about = "AI provider gateway", version)]
struct Args {
    /// Address to bind, overriding GATEWAY_HOST.
    #[arg(long)]
    host: Option<std::net::IpAddr>,

    /// Port to bind, overriding GATEWAY_PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,modelgate=debug"));
    if args.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_env().context("failed to load configuration")?;

    let host = args.host.unwrap_or(config.server.host);
    let port = args.port.unwrap_or(config.server.port);
    let addr = SocketAddr::new(host, port);

    let registry = Arc::new(ModelRegistry::builtin());
    info!(models = registry.len(), "model registry loaded");

    let cache = Arc::new(CacheStore::connect(config.cache.url.as_deref()).await);
    let providers = ProviderSet::from_config(&config.providers);
    let stats = Arc::new(GatewayStats::new());
    let router = Arc::new(RequestRouter::new(
        registry,
        providers,
        cache,
        stats,
        &config.cache,
    ));
    let limiters = Arc::new(GatewayLimiters::new(&config.rate_limits));

    let gateway = Gateway::bind(addr, AppState { router, limiters })
        .await
        .context("failed to bind gateway")?;

    gateway
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    Ok(())
}
