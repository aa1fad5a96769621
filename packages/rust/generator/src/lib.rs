//! Chat-completion generator for session summaries.
//!
//! One HTTP client serves every backend. Which backend, model, and key are
//! used is decided by the [`GeneratorConfig`] passed to each call:
//! - OpenRouter and OpenAI-compatible servers: `POST {api_base}/chat/completions`
//! - Ollama: `POST {api_base}/api/chat`

mod prompt;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use wgdigest_shared::{GeneratorConfig, ModelBackend, Result, WgDigestError};

pub use prompt::{TRUNCATION_MARKER, truncate_transcript};

/// Sent to OpenRouter for attribution on its dashboard.
const APP_TITLE: &str = "wgdigest";

// ---------------------------------------------------------------------------
// ChatGenerator
// ---------------------------------------------------------------------------

/// [`Generator`](wgdigest_shared::Generator) backed by a chat-completion API.
#[derive(Debug, Clone)]
pub struct ChatGenerator {
    client: Client,
}

impl ChatGenerator {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("wgdigest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                WgDigestError::Generation(format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    async fn complete_openai(
        &self,
        messages: Vec<ChatMessage>,
        config: &GeneratorConfig,
    ) -> Result<String> {
        let backend = config.backend.as_str();
        let url = format!("{}/chat/completions", config.api_base());
        let request = ChatCompletionRequest {
            model: config.model.clone(),
            messages,
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
        };

        let mut builder = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(config.timeout_secs))
            .json(&request);
        if let Some(key) = config.api_key()? {
            builder = builder.bearer_auth(key);
        }
        if config.backend == ModelBackend::OpenRouter {
            builder = builder.header("X-Title", APP_TITLE);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| WgDigestError::Generation(format!("{backend} request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WgDigestError::Generation(format!(
                "{backend} API error ({status}): {body}"
            )));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            WgDigestError::Generation(format!("failed to parse {backend} response: {e}"))
        })?;

        if let Some(usage) = &body.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "token usage"
            );
        }

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| WgDigestError::Generation(format!("no content in {backend} response")))
    }

    async fn complete_ollama(
        &self,
        messages: Vec<ChatMessage>,
        config: &GeneratorConfig,
    ) -> Result<String> {
        let url = format!("{}/api/chat", config.api_base());
        let request = OllamaChatRequest {
            model: config.model.clone(),
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| WgDigestError::Generation(format!("ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WgDigestError::Generation(format!(
                "ollama API error ({status}): {body}"
            )));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|e| {
            WgDigestError::Generation(format!("failed to parse ollama response: {e}"))
        })?;

        if !body.done {
            warn!("ollama reported an unfinished response");
        }
        Ok(body.message.content)
    }
}

#[async_trait]
impl wgdigest_shared::Generator for ChatGenerator {
    #[instrument(skip(self, content, config), fields(backend = config.backend.as_str(), model = %config.model))]
    async fn generate(
        &self,
        content: &str,
        display_name: &str,
        config: &GeneratorConfig,
    ) -> Result<String> {
        let transcript = truncate_transcript(content, config.max_input_chars);
        if transcript.len() != content.len() {
            warn!(
                display_name,
                chars = content.chars().count(),
                limit = config.max_input_chars,
                "transcript truncated"
            );
        }

        let messages = vec![
            ChatMessage {
                role: "system".into(),
                content: prompt::SYSTEM_PROMPT.into(),
            },
            ChatMessage {
                role: "user".into(),
                content: prompt::user_prompt(display_name, &transcript),
            },
        ];

        let start = Instant::now();
        let text = match config.backend {
            ModelBackend::OpenRouter | ModelBackend::OpenAi => {
                self.complete_openai(messages, config).await?
            }
            ModelBackend::Ollama => self.complete_ollama(messages, config).await?,
        };

        info!(
            display_name,
            chars = text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "summary generated"
        );
        Ok(text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgdigest_shared::Generator;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, backend: ModelBackend, key_env: &str) -> GeneratorConfig {
        GeneratorConfig {
            backend,
            model: "test-model".into(),
            api_base: Some(format!("{}/v1/", server.uri())),
            api_key_env: key_env.into(),
            ..GeneratorConfig::default()
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
        })
    }

    #[tokio::test]
    async fn openai_compatible_backend() {
        let server = MockServer::start().await;
        // SAFETY: test-unique variable name, no other thread reads it.
        unsafe { std::env::set_var("WGD_TEST_KEY_OPENAI", "sk-test") };

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({ "model": "test-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Summary.  ")))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server, ModelBackend::OpenAi, "WGD_TEST_KEY_OPENAI");
        let generator = ChatGenerator::new().unwrap();
        let text = generator
            .generate("Chair: hello", "QUIC", &config)
            .await
            .unwrap();
        assert_eq!(text, "Summary.");
    }

    #[tokio::test]
    async fn ollama_backend_needs_no_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/api/chat"))
            .and(body_partial_json(serde_json::json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": "Local summary." },
                "done": true
            })))
            .mount(&server)
            .await;

        let config = config_for(&server, ModelBackend::Ollama, "WGD_TEST_KEY_UNSET");
        let text = ChatGenerator::new()
            .unwrap()
            .generate("Chair: hello", "QUIC", &config)
            .await
            .unwrap();
        assert_eq!(text, "Local summary.");
    }

    #[tokio::test]
    async fn backend_is_chosen_per_call() {
        let server = MockServer::start().await;
        // SAFETY: test-unique variable name, no other thread reads it.
        unsafe { std::env::set_var("WGD_TEST_KEY_SWITCH", "sk-switch") };

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("remote")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "content": "local" }, "done": true
            })))
            .mount(&server)
            .await;

        let generator = ChatGenerator::new().unwrap();
        let remote = config_for(&server, ModelBackend::OpenRouter, "WGD_TEST_KEY_SWITCH");
        let local = config_for(&server, ModelBackend::Ollama, "WGD_TEST_KEY_SWITCH");

        assert_eq!(generator.generate("t", "X", &local).await.unwrap(), "local");
        assert_eq!(generator.generate("t", "X", &remote).await.unwrap(), "remote");
        assert_eq!(generator.generate("t", "X", &local).await.unwrap(), "local");
    }

    #[tokio::test]
    async fn api_error_is_generation_error() {
        let server = MockServer::start().await;
        // SAFETY: test-unique variable name, no other thread reads it.
        unsafe { std::env::set_var("WGD_TEST_KEY_ERR", "sk-err") };

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let config = config_for(&server, ModelBackend::OpenRouter, "WGD_TEST_KEY_ERR");
        let err = ChatGenerator::new()
            .unwrap()
            .generate("t", "X", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, WgDigestError::Generation(_)));
        assert!(err.to_string().contains("429"));
        assert!(!err.is_persistence());
    }

    #[tokio::test]
    async fn missing_content_is_generation_error() {
        let server = MockServer::start().await;
        // SAFETY: test-unique variable name, no other thread reads it.
        unsafe { std::env::set_var("WGD_TEST_KEY_EMPTY", "sk-empty") };

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let config = config_for(&server, ModelBackend::OpenAi, "WGD_TEST_KEY_EMPTY");
        let err = ChatGenerator::new()
            .unwrap()
            .generate("t", "X", &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no content"));
    }

    #[tokio::test]
    async fn long_transcripts_are_truncated_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "content": "ok" }, "done": true
            })))
            .mount(&server)
            .await;

        let mut config = config_for(&server, ModelBackend::Ollama, "WGD_TEST_KEY_UNSET");
        config.max_input_chars = 50;
        ChatGenerator::new()
            .unwrap()
            .generate(&"x".repeat(500), "X", &config)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let user = sent["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains(TRUNCATION_MARKER.trim()));
        assert!(!user.contains(&"x".repeat(51)));
    }
}
