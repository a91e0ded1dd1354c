//! Client for OpenAI-compatible provider APIs.
//!
//! OpenRouter, A4F and Groq all speak the same wire dialect:
//! `/chat/completions`, `/images/generations` and `/audio/transcriptions`
//! under a versioned base URL with bearer auth. One client type,
//! parameterized by provider identity and configuration, covers all three.

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
};

/// Largest audio upload forwarded to transcription, in bytes (25 MiB).
pub const MAX_TRANSCRIPTION_BYTES: usize = 25 * 1024 * 1024;

pub struct OpenAiLikeClient {
    id: ProviderId,
    config: ProviderConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiLikeClient {
    pub fn new(id: ProviderId, config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { id, config, http }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Bearer token, or a fast `Unconfigured` failure when no key is set.
    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .ok_or_else(|| ProviderError::Unconfigured {
                provider: self.id.to_string(),
            })
    }

    fn apply_headers(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.config.extra_headers {
            req = req.header(*name, *value);
        }
        req
    }

    async fn read_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Transport {
            provider: self.id.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(ProviderError::Upstream {
                provider: self.id.to_string(),
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse {
            provider: self.id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[super::ChatMessage],
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<ProviderResult, ProviderError> {
        let key = self.api_key()?;
        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        debug!(provider = %self.id, model, "sending chat completion request");
        let response = self
            .apply_headers(self.http.post(self.endpoint("chat/completions")))
            .bearer_auth(key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(self.id, timeout, e))?;

        let parsed: ChatCompletionResponse = self.read_response(response).await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: self.id.to_string(),
                reason: "response contained no choices".to_string(),
            })?;

        Ok(ProviderResult::Chat {
            content,
            total_tokens: parsed.usage.and_then(|u| u.total_tokens),
        })
    }

    async fn image(
        &self,
        model: &str,
        prompt: &str,
        size: &str,
        quality: &str,
        style: &str,
        timeout: Duration,
    ) -> Result<ProviderResult, ProviderError> {
        let key = self.api_key()?;
        let body = json!({
            "model": model,
            "prompt": prompt,
            "size": size,
            "quality": quality,
            "style": style,
            "n": 1,
        });

        debug!(provider = %self.id, model, "sending image generation request");
        let response = self
            .apply_headers(self.http.post(self.endpoint("images/generations")))
            .bearer_auth(key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(self.id, timeout, e))?;

        let parsed: ImageGenerationResponse = self.read_response(response).await?;
        let url = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.url)
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: self.id.to_string(),
                reason: "response contained no image data".to_string(),
            })?;

        Ok(ProviderResult::Image { url })
    }

    async fn transcribe(
        &self,
        model: &str,
        audio: Vec<u8>,
        filename: String,
        content_type: String,
        language: String,
        timeout: Duration,
    ) -> Result<ProviderResult, ProviderError> {
        let key = self.api_key()?;

        if audio.len() > MAX_TRANSCRIPTION_BYTES {
            return Err(ProviderError::Unsupported {
                provider: self.id.to_string(),
                operation: "transcription of files over 25 MiB",
            });
        }

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename)
            .mime_str(&content_type)
            .map_err(|e| ProviderError::InvalidResponse {
                provider: self.id.to_string(),
                reason: format!("invalid content type: {e}"),
            })?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", model.to_string())
            .text("language", language);

        debug!(provider = %self.id, model, "sending transcription request");
        let response = self
            .apply_headers(self.http.post(self.endpoint("audio/transcriptions")))
            .bearer_auth(key)
            .timeout(timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_send_error(self.id, timeout, e))?;

        let parsed: TranscriptionResponse = self.read_response(response).await?;
        Ok(ProviderResult::Transcription { text: parsed.text })
    }
}

#[async_trait]
impl ProviderClient for OpenAiLikeClient {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn invoke(
        &self,
        upstream_model_id: &str,
        request: ProviderRequest,
        timeout: Duration,
    ) -> Result<ProviderResult, ProviderError> {
        match request {
            ProviderRequest::Chat {
                messages,
                temperature,
                max_tokens,
            } => {
                self.chat(upstream_model_id, &messages, temperature, max_tokens, timeout)
                    .await
            }
            ProviderRequest::Image {
                prompt,
                size,
                quality,
                style,
            } => {
                self.image(upstream_model_id, &prompt, &size, &quality, &style, timeout)
                    .await
            }
            ProviderRequest::Transcribe {
                audio,
                filename,
                content_type,
                language,
            } => {
                self.transcribe(upstream_model_id, audio, filename, content_type, language, timeout)
                    .await
            }
            ProviderRequest::Search { .. } => Err(ProviderError::Unsupported {
                provider: self.id.to_string(),
                operation: "web search",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OPENROUTER_BASE_URL;

    fn unconfigured_client() -> OpenAiLikeClient {
        OpenAiLikeClient::new(
            ProviderId::OpenRouter,
            ProviderConfig {
                base_url: OPENROUTER_BASE_URL.to_string(),
                api_key: None,
                extra_headers: Vec::new(),
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = OpenAiLikeClient::new(
            ProviderId::A4f,
            ProviderConfig {
                base_url: "https://api.a4f.dev/v1/".to_string(),
                api_key: None,
                extra_headers: Vec::new(),
            },
            reqwest::Client::new(),
        );
        assert_eq!(
            client.endpoint("chat/completions"),
            "https://api.a4f.dev/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn unconfigured_client_fails_before_network() {
        let client = unconfigured_client();
        let err = client
            .invoke(
                "deepseek/deepseek-r1-0528:free",
                ProviderRequest::Chat {
                    messages: vec![super::super::ChatMessage::user("hi")],
                    temperature: 0.7,
                    max_tokens: 100,
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unconfigured { .. }));
    }

    #[tokio::test]
    async fn search_is_unsupported() {
        let client = unconfigured_client();
        let err = client
            .invoke(
                "anything",
                ProviderRequest::Search {
                    query: "rust".to_string(),
                    max_results: 5,
                    include_domains: Vec::new(),
                    exclude_domains: Vec::new(),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn oversized_audio_rejected_before_network() {
        let client = OpenAiLikeClient::new(
            ProviderId::Groq,
            ProviderConfig {
                base_url: "https://api.groq.com/openai/v1".to_string(),
                api_key: Some(secrecy::SecretString::from("gsk-test".to_string())),
                extra_headers: Vec::new(),
            },
            reqwest::Client::new(),
        );
        let err = client
            .invoke(
                "distil-whisper-large-v3-en",
                ProviderRequest::Transcribe {
                    audio: vec![0u8; MAX_TRANSCRIPTION_BYTES + 1],
                    filename: "big.wav".to_string(),
                    content_type: "audio/wav".to_string(),
                    language: "en".to_string(),
                },
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported { .. }));
        assert!(err.is_client_fault());
    }

    #[test]
    fn parses_chat_completion_body() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(parsed.usage.and_then(|u| u.total_tokens), Some(8));
    }
}
