//! Configuration for the gateway.
//!
//! Everything is resolved from environment variables (with a `.env` file
//! loaded when present). A provider with no API key is still constructed —
//! it is "unconfigured", and any call attempt fails fast with a
//! distinguishable error instead of an opaque network failure.

use std::net::{IpAddr, Ipv4Addr};

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default provider base URLs.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const A4F_BASE_URL: &str = "https://api.a4f.dev/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const TAVILY_BASE_URL: &str = "https://api.tavily.com";

/// Main configuration for the gateway.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub cache: CacheConfig,
    pub rate_limits: RateLimitConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            server: ServerConfig::from_env()?,
            providers: ProvidersConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            rate_limits: RateLimitConfig::from_env()?,
        })
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let host = match optional_env("GATEWAY_HOST")? {
            Some(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
                key: "GATEWAY_HOST".to_string(),
                message: format!("'{s}' is not a valid IP address"),
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };
        let port = parse_optional_env("GATEWAY_PORT", 8000u16)?;
        Ok(Self { host, port })
    }
}

/// Static configuration for one upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Missing credential means the provider is unconfigured; calls to it
    /// fail fast with `ProviderError::Unconfigured`.
    pub api_key: Option<SecretString>,
    /// Extra static headers sent with every request to this provider.
    pub extra_headers: Vec<(&'static str, &'static str)>,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Per-provider configuration for all supported upstreams.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub openrouter: ProviderConfig,
    pub a4f: ProviderConfig,
    pub groq: ProviderConfig,
    pub tavily: ProviderConfig,
}

impl ProvidersConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            openrouter: ProviderConfig {
                base_url: optional_env("OPENROUTER_BASE_URL")?
                    .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string()),
                api_key: optional_env("OPENROUTER_API_KEY")?.map(SecretString::from),
                // OpenRouter attributes traffic via these headers.
                extra_headers: vec![
                    ("HTTP-Referer", "https://ego-ai.com"),
                    ("X-Title", "EGO AI Assistant"),
                ],
            },
            a4f: ProviderConfig {
                base_url: optional_env("A4F_BASE_URL")?.unwrap_or_else(|| A4F_BASE_URL.to_string()),
                api_key: optional_env("A4F_API_KEY")?.map(SecretString::from),
                extra_headers: Vec::new(),
            },
            groq: ProviderConfig {
                base_url: optional_env("GROQ_BASE_URL")?
                    .unwrap_or_else(|| GROQ_BASE_URL.to_string()),
                api_key: optional_env("GROQ_API_KEY")?.map(SecretString::from),
                extra_headers: Vec::new(),
            },
            tavily: ProviderConfig {
                base_url: optional_env("TAVILY_BASE_URL")?
                    .unwrap_or_else(|| TAVILY_BASE_URL.to_string()),
                api_key: optional_env("TAVILY_API_KEY")?.map(SecretString::from),
                extra_headers: Vec::new(),
            },
        })
    }
}

/// Response cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URL. When unset or unreachable the cache degrades
    /// to a process-local map.
    pub url: Option<String>,
    /// TTL in seconds for cached chat completions (default 3600).
    pub chat_ttl_secs: u64,
    /// TTL in seconds for cached search results (default 1800).
    pub search_ttl_secs: u64,
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: optional_env("CACHE_URL")?,
            chat_ttl_secs: parse_optional_env("CACHE_CHAT_TTL_SECS", 3600u64)?,
            search_ttl_secs: parse_optional_env("CACHE_SEARCH_TTL_SECS", 1800u64)?,
        })
    }
}

/// Per-route request budgets, per client address, per minute.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub chat_per_minute: u64,
    pub search_per_minute: u64,
    pub stats_per_minute: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            chat_per_minute: 30,
            search_per_minute: 20,
            stats_per_minute: 10,
        }
    }
}

impl RateLimitConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            chat_per_minute: parse_optional_env("RATE_LIMIT_CHAT", defaults.chat_per_minute)?,
            search_per_minute: parse_optional_env("RATE_LIMIT_SEARCH", defaults.search_per_minute)?,
            stats_per_minute: parse_optional_env("RATE_LIMIT_STATS", defaults.stats_per_minute)?,
        })
    }
}

// Helper functions

pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!(
            "failed to read {key}: {e}"
        ))),
    }
}

pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}
