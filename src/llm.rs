//! Language model providers.
//!
//! | `llm.provider` | Endpoint |
//! |----------------|----------|
//! | `openai` | `POST {url}/chat/completions` (OpenAI, Groq, and other compatible APIs) |
//! | `ollama` | `POST {url}/api/chat` with `stream: false` |
//!
//! Both retry transient failures with the policy in [`crate::http`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use ragchat_core::llm::{GenerationRequest, LanguageModel};

use crate::config::LlmConfig;
use crate::embedding::{OLLAMA_DEFAULT_URL, OPENAI_DEFAULT_URL};
use crate::http::{self, Endpoint};

/// Create the [`LanguageModel`] named by `config.provider`.
pub fn create_language_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// OpenAI-compatible chat completions.
pub struct OpenAIChat {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key_env: String,
    max_retries: u32,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: http::join_url(
                config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL),
                "chat/completions",
            ),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let api_key = http::api_key_from_env(&self.api_key_env)
            .ok_or_else(|| anyhow!("{} environment variable not set", self.api_key_env))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        let endpoint = Endpoint {
            service: "OpenAI",
            url: self.url.clone(),
            bearer: Some(&api_key),
        };
        let json = http::post_json(&self.client, &endpoint, &body, self.max_retries).await?;
        parse_openai_chat(&json)
    }
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid chat completion response: missing choices[0].message.content"))
}

/// Ollama chat endpoint.
pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: http::join_url(
                config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL),
                "api/chat",
            ),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });
        let endpoint = Endpoint {
            service: "Ollama",
            url: self.url.clone(),
            bearer: None,
        };
        let json = http::post_json(&self.client, &endpoint, &body, self.max_retries).await?;
        parse_ollama_chat(&json)
    }
}

fn parse_ollama_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
}
