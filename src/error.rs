//! Error types for the gateway.

use std::time::Duration;

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Failures from an upstream AI provider call.
///
/// Every variant carries the provider id so envelope errors and log lines
/// can name the upstream that failed. No variant is retried; a transient
/// upstream failure surfaces immediately to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} is not configured (missing API key)")]
    Unconfigured { provider: String },

    #[error("Provider {provider} did not respond within {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} returned HTTP {status}: {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Connection to provider {provider} failed: {reason}")]
    Transport { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },
}

impl ProviderError {
    /// Whether this failure is the caller's fault (4xx at the route
    /// boundary) rather than an upstream/server condition.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// Request-level failures raised before or during routing.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid parameter {field}: {message}")]
    InvalidParameter { field: String, message: String },

    #[error("Rate limit exceeded for {route}. Try again shortly.")]
    RateLimited { route: &'static str },

    #[error("{0}")]
    Provider(#[from] ProviderError),
}

/// Cache backend failures. Always absorbed: logged and treated as a miss,
/// never propagated past the cache boundary.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// HTTP server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed { addr: String, reason: String },
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::MissingEnvVar("TAVILY_API_KEY".to_string());
        let msg = err.to_string();
        assert!(
            msg.contains("TAVILY_API_KEY"),
            "Should mention the variable name: {msg}"
        );

        let err = ConfigError::InvalidValue {
            key: "GATEWAY_PORT".to_string(),
            message: "must be a number".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("GATEWAY_PORT"), "Should mention the key: {msg}");
    }

    #[test]
    fn provider_error_display() {
        let err = ProviderError::Unconfigured {
            provider: "a4f".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a4f"), "Should mention provider: {msg}");
        assert!(msg.contains("API key"), "Should mention the cause: {msg}");

        let err = ProviderError::Upstream {
            provider: "openrouter".to_string(),
            status: 503,
            message: "model overloaded".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"), "Should mention status: {msg}");
        assert!(msg.contains("model overloaded"), "Should mention body: {msg}");

        let err = ProviderError::Timeout {
            provider: "groq".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("groq"));
    }

    #[test]
    fn route_error_display() {
        let err = RouteError::InvalidModel("gpt-99".to_string());
        assert!(err.to_string().contains("gpt-99"));

        let err = RouteError::InvalidParameter {
            field: "temperature".to_string(),
            message: "must be between 0 and 2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("temperature"), "Should mention field: {msg}");

        let err = RouteError::RateLimited { route: "chat" };
        assert!(err.to_string().contains("chat"));
    }

    #[test]
    fn unsupported_is_client_fault() {
        let err = ProviderError::Unsupported {
            provider: "tavily".to_string(),
            operation: "chat completion",
        };
        assert!(err.is_client_fault());

        let err = ProviderError::Transport {
            provider: "tavily".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(!err.is_client_fault());
    }

    #[test]
    fn top_level_error_from_conversions() {
        let config_err = ConfigError::MissingEnvVar("TEST".to_string());
        let err: Error = config_err.into();
        assert!(matches!(err, Error::Config(_)));

        let route_err = RouteError::InvalidModel("x".to_string());
        let err: Error = route_err.into();
        assert!(matches!(err, Error::Route(_)));
    }
}
