//! HTTP client for the collaborator prompts
//!
//! Both prompts ask for one small JSON object, so the only entry point is
//! [`LlmClient::complete_json`]: send a system/user pair, cut the object out
//! of the reply and decode it. The request shape follows the endpoint:
//! Anthropic's messages API, or the chat-completions shape that OpenAI,
//! DeepSeek and local servers accept.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::core::config::EffectsConfig;
use crate::core::error::{Result, SimError};
use crate::llm::parser::decode_reply;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wire {
    Messages,
    ChatCompletions,
}

impl Wire {
    fn for_endpoint(endpoint: &str) -> Self {
        if endpoint.contains("anthropic.com") {
            Wire::Messages
        } else {
            Wire::ChatCompletions
        }
    }

    fn body(self, model: &str, max_tokens: u32, system: &str, user: &str) -> Value {
        match self {
            Wire::Messages => json!({
                "model": model,
                "max_tokens": max_tokens,
                "system": system,
                "messages": [{ "role": "user", "content": user }],
            }),
            Wire::ChatCompletions => json!({
                "model": model,
                "max_tokens": max_tokens,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
            }),
        }
    }

    /// JSON pointer to the reply text in a response body
    fn reply_pointer(self) -> &'static str {
        match self {
            Wire::Messages => "/content/0/text",
            Wire::ChatCompletions => "/choices/0/message/content",
        }
    }
}

pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    wire: Wire,
}

impl LlmClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, max_tokens: u32) -> Self {
        let endpoint = endpoint.into();
        let wire = Wire::for_endpoint(&endpoint);
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            wire,
        }
    }

    /// Endpoint and model from the effects config; the key from the
    /// environment variable the config names
    pub fn from_config(config: &EffectsConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SimError::LlmError(format!("{} not set", config.api_key_env)))?;
        Ok(Self::new(
            config.api_url.clone(),
            api_key,
            config.model.clone(),
            config.max_reply_tokens,
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask for a single JSON object and decode it as `T`
    pub async fn complete_json<T: DeserializeOwned>(&self, system: &str, user: &str) -> Result<T> {
        let text = self.reply_text(system, user).await?;
        decode_reply(&text)
    }

    async fn reply_text(&self, system: &str, user: &str) -> Result<String> {
        let request = self
            .http
            .post(&self.endpoint)
            .json(&self.wire.body(&self.model, self.max_tokens, system, user));
        let request = match self.wire {
            Wire::Messages => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            Wire::ChatCompletions => request.bearer_auth(&self.api_key),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SimError::LlmError(format!("{} answered {}: {}", self.endpoint, status, detail)));
        }
        let body: Value = response.json().await?;
        reply_in(self.wire, &body)
    }
}

fn reply_in(wire: Wire, body: &Value) -> Result<String> {
    body.pointer(wire.reply_pointer())
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| SimError::LlmError("reply carries no text".into()))
}
