//! Minimal AI capability client: send a prompt, get text back.
//!
//! Two provider wire shapes are supported (Anthropic-style messages and
//! OpenAI-style chat completions), selected by configuration. The pipeline
//! never depends on anything beyond `complete`.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ScrapeError;
use crate::infrastructure::config::{AiConfig, AiProvider};

const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct AiClient {
    client: Client,
    provider: AiProvider,
    endpoint: String,
    model: String,
    token: String,
    max_tokens: u32,
    temperature: f32,
}

impl AiClient {
    /// Build a client from configuration, or `None` when the capability is
    /// not configured (no provider, or token missing from the environment).
    pub fn from_config(config: &AiConfig) -> Option<Self> {
        if config.provider == AiProvider::None {
            return None;
        }
        let token = match std::env::var(&config.token_env) {
            Ok(token) if !token.is_empty() => token,
            _ => {
                warn!(
                    token_env = %config.token_env,
                    "AI provider configured but token missing; running without AI"
                );
                return None;
            }
        };
        let endpoint = if config.endpoint.is_empty() {
            match config.provider {
                AiProvider::Anthropic => ANTHROPIC_ENDPOINT.to_string(),
                AiProvider::Openai => OPENAI_ENDPOINT.to_string(),
                AiProvider::None => return None,
            }
        } else {
            config.endpoint.clone()
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .ok()?;
        Some(Self {
            client,
            provider: config.provider,
            endpoint,
            model: config.model.clone(),
            token,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Send a prompt and return the model's text response.
    pub async fn complete(&self, prompt: &str) -> Result<String, ScrapeError> {
        let response = match self.provider {
            AiProvider::Anthropic => {
                self.client
                    .post(&self.endpoint)
                    .header("x-api-key", &self.token)
                    .header("anthropic-version", "2023-06-01")
                    .json(&json!({
                        "model": self.model,
                        "max_tokens": self.max_tokens,
                        "messages": [{"role": "user", "content": prompt}],
                    }))
                    .send()
                    .await
            }
            AiProvider::Openai => {
                self.client
                    .post(&self.endpoint)
                    .bearer_auth(&self.token)
                    .json(&json!({
                        "model": self.model,
                        "max_tokens": self.max_tokens,
                        "temperature": self.temperature,
                        "messages": [{"role": "user", "content": prompt}],
                    }))
                    .send()
                    .await
            }
            AiProvider::None => {
                return Err(ScrapeError::AiResponse("no provider configured".to_string()))
            }
        }
        .map_err(|source| ScrapeError::Network {
            url: self.endpoint.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::AiResponse(format!(
                "provider returned HTTP {status}"
            )));
        }

        let body: Value = response.json().await.map_err(|source| ScrapeError::Network {
            url: self.endpoint.clone(),
            source,
        })?;

        let text = match self.provider {
            AiProvider::Anthropic => body
                .pointer("/content/0/text")
                .and_then(Value::as_str)
                .map(str::to_string),
            AiProvider::Openai => body
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_string),
            AiProvider::None => None,
        };

        debug!(provider = ?self.provider, got = text.is_some(), "AI completion finished");
        text.ok_or_else(|| ScrapeError::AiResponse("response missing text content".to_string()))
    }
}

/// Pull a JSON object out of a model response, tolerating markdown fences
/// and surrounding prose.
pub fn extract_json_object(text: &str) -> Option<String> {
    let unfenced = if let Some(start) = text.find("```json") {
        text[start + 7..].split("```").next().unwrap_or(text)
    } else if let Some(start) = text.find("```") {
        text[start + 3..].split("```").next().unwrap_or(text)
    } else {
        text
    };
    let open = unfenced.find('{')?;
    let close = unfenced.rfind('}')?;
    if close < open {
        return None;
    }
    Some(unfenced[open..=close].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_fenced_response() {
        let response = "Here you go:\n```json\n{\"name\": \"iPhone\"}\n```\nanything else?";
        assert_eq!(
            extract_json_object(response).as_deref(),
            Some("{\"name\": \"iPhone\"}")
        );
    }

    #[test]
    fn extracts_bare_json() {
        assert_eq!(
            extract_json_object("{\"a\": 1}").as_deref(),
            Some("{\"a\": 1}")
        );
        assert_eq!(extract_json_object("no json here"), None);
    }
}
