//! Model registry: the static catalog of supported models.
//!
//! Built once at startup and shared read-only across all concurrent
//! requests. Every descriptor names its owning provider, so the router can
//! pick a provider client without branching on provider strings.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RouteError;

/// Upstream provider identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenRouter,
    A4f,
    Groq,
    Tavily,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::A4f => "a4f",
            Self::Groq => "groq",
            Self::Tavily => "tavily",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of request a model serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Chat,
    Thinking,
    Image,
    Transcription,
    Search,
}

/// Cost tier, informational only at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Free,
    Premium,
}

/// Immutable description of one supported model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    /// Stable key callers use to select this model.
    pub key: &'static str,
    /// Human-readable name returned in responses.
    pub display_name: &'static str,
    pub provider: ProviderId,
    /// Identifier the upstream API expects.
    pub upstream_id: &'static str,
    pub capability: Capability,
    pub cost: CostTier,
    /// Ceiling for caller-requested max tokens.
    pub max_output_tokens: u32,
    /// Per-call timeout applied to the upstream request.
    #[serde(serialize_with = "serialize_secs", rename = "timeout_secs")]
    pub timeout: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Sentinel model key meaning "let the auto-selector choose".
pub const AUTO_MODEL_KEY: &str = "auto";

/// Registry of all supported models, keyed by model key.
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    index: HashMap<&'static str, usize>,
}

macro_rules! descriptor {
    ($key:literal, $name:literal, $provider:expr, $upstream:literal, $cap:expr, $cost:expr) => {
        ModelDescriptor {
            key: $key,
            display_name: $name,
            provider: $provider,
            upstream_id: $upstream,
            capability: $cap,
            cost: $cost,
            max_output_tokens: 4000,
            timeout: Duration::from_secs(60),
        }
    };
}

impl ModelRegistry {
    /// Build the registry with the built-in catalog.
    pub fn builtin() -> Self {
        use Capability::*;
        use CostTier::*;
        use ProviderId::*;

        Self::from_descriptors(vec![
            // Free models (OpenRouter)
            descriptor!("deepseek-r1-free", "DeepSeek R1", OpenRouter, "deepseek/deepseek-r1-0528:free", Thinking, Free),
            descriptor!("qwen-3-235b-free", "Qwen 3 235B", OpenRouter, "qwen/qwen3-235b-a22b:free", Chat, Free),
            descriptor!("llama-4-scout-free", "Llama 4 Scout", OpenRouter, "meta-llama/llama-4-scout:free", Chat, Free),
            descriptor!("gemini-2-5-pro-free", "Gemini 2.5 Pro", OpenRouter, "google/gemini-2.5-pro-exp-03-25", Chat, Free),
            descriptor!("llama-3-1-405b-free", "Llama 3.1 405B", OpenRouter, "meta-llama/llama-3.1-405b-instruct:free", Chat, Free),
            descriptor!("gemma-3-27b-free", "Gemma 3 27B", OpenRouter, "google/gemma-3-27b-it:free", Chat, Free),
            // Premium models (A4F)
            descriptor!("imagen-4-premium", "Imagen 4", A4f, "provider-4/imagen-4", Image, Premium),
            descriptor!("grok-4-premium", "Grok 4", A4f, "provider-3/grok-4-0709", Chat, Premium),
            descriptor!("gpt-4-1-premium", "GPT-4.1", A4f, "provider-6/gpt-4.1", Chat, Premium),
            descriptor!("o3-pro-premium", "O3 Pro", A4f, "provider-6/o3-pro", Chat, Premium),
            descriptor!("qwen-3-235b-premium", "Qwen 3 235B Pro", A4f, "provider-2/qwen-3-235b", Chat, Premium),
            descriptor!("deepseek-r1-premium", "DeepSeek R1 Pro", A4f, "provider-1/deepseek-r1-0528", Thinking, Premium),
            // Specialized models
            descriptor!("whisper-transcription", "Whisper Large V3", Groq, "distil-whisper-large-v3-en", Transcription, Free),
            descriptor!("tavily-search", "Tavily Search", Tavily, "tavily-search-v1", Search, Free),
        ])
    }

    fn from_descriptors(models: Vec<ModelDescriptor>) -> Self {
        let index = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.key, i))
            .collect();
        Self { models, index }
    }

    /// Look up a model by key.
    pub fn resolve(&self, key: &str) -> Result<&ModelDescriptor, RouteError> {
        self.index
            .get(key)
            .map(|&i| &self.models[i])
            .ok_or_else(|| RouteError::InvalidModel(key.to_string()))
    }

    /// All registered models, in catalog order.
    pub fn list_all(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
