//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations selected by
//! `embedding.provider`:
//! - **[`DisabledEmbedder`]** - returns errors; used when embeddings are not configured.
//! - **[`OpenAIEmbedder`]** - OpenAI-compatible `POST {url}/embeddings`.
//! - **[`OllamaEmbedder`]** - a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`** - fastembed ONNX models, no network after the model download
//!   (feature `local-embeddings`).
//! - **`hash`** - the deterministic bag-of-words embedder, for offline runs.
//!
//! HTTP providers retry transient failures, see [`crate::http`].

#[cfg(feature = "local-embeddings")]
mod local;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use ragchat_core::embedding::Embedder;
use ragchat_core::offline::HashingEmbedder;

use crate::config::EmbeddingConfig;
use crate::http::{self, Endpoint};

#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

pub const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Create the [`Embedder`] named by `config.provider`.
///
/// Construction never contacts the service and does not require the API
/// key; a missing key fails the first `embed` call instead.
///
/// # Errors
///
/// Unknown provider names, missing `model`/`dims`, or `local` without the
/// `local-embeddings` feature.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        "hash" => Ok(Box::new(HashingEmbedder::new(config.dims.unwrap_or(256)))),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn required_model(config: &EmbeddingConfig) -> Result<String> {
    config.model.clone().ok_or_else(|| {
        anyhow!(
            "embedding.model required for {} provider",
            config.provider
        )
    })
}

fn required_dims(config: &EmbeddingConfig) -> Result<usize> {
    config
        .dims
        .filter(|d| *d > 0)
        .ok_or_else(|| anyhow!("embedding.dims required for {} provider", config.provider))
}

/// Reject vectors whose length disagrees with the configured `dims`.
fn check_dims(vectors: &[Vec<f32>], dims: usize, model: &str) -> Result<()> {
    if let Some(v) = vectors.iter().find(|v| v.len() != dims) {
        bail!(
            "model '{}' returned {}-dimensional vectors but embedding.dims is {}",
            model,
            v.len(),
            dims
        );
    }
    Ok(())
}

// ============ Disabled Provider ============

/// Always fails. Used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// OpenAI-compatible embeddings API.
///
/// The API key is read from the environment variable named by
/// `embedding.api_key_env` (default `OPENAI_API_KEY`).
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    api_key_env: String,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: http::join_url(
                config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL),
                "embeddings",
            ),
            model: required_model(config)?,
            dims: required_dims(config)?,
            api_key_env: config.api_key_env.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = http::api_key_from_env(&self.api_key_env)
            .ok_or_else(|| anyhow!("{} environment variable not set", self.api_key_env))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = Endpoint {
            service: "OpenAI",
            url: self.url.clone(),
            bearer: Some(&api_key),
        };
        let json = http::post_json(&self.client, &endpoint, &body, self.max_retries).await?;
        let vectors = parse_openai_response(&json)?;
        check_dims(&vectors, self.dims, &self.model)?;
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Local Ollama instance, `POST /api/embed`.
///
/// Requires Ollama to be running with an embedding model pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: http::join_url(
                config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL),
                "api/embed",
            ),
            model: required_model(config)?,
            dims: required_dims(config)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let endpoint = Endpoint {
            service: "Ollama",
            url: self.url.clone(),
            bearer: None,
        };
        let json = http::post_json(&self.client, &endpoint, &body, self.max_retries).await?;
        let vectors = parse_ollama_response(&json)?;
        check_dims(&vectors, self.dims, &self.model)?;
        Ok(vectors)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            Ok(embedding
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_create_known_providers() {
        let openai = create_embedder(&config("openai")).unwrap();
        assert_eq!(openai.model_name(), "text-embedding-3-small");
        assert_eq!(openai.dims(), 1536);

        let hash = create_embedder(&EmbeddingConfig {
            dims: Some(32),
            ..config("hash")
        })
        .unwrap();
        assert_eq!(hash.dims(), 32);

        assert_eq!(create_embedder(&config("disabled")).unwrap().model_name(), "disabled");
    }

    #[test]
    fn test_unknown_provider() {
        let err = create_embedder(&config("cohere")).err().unwrap();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[tokio::test]
    async fn test_disabled_fails() {
        let err = DisabledEmbedder.embed(&["x".to_string()]).await.unwrap_err();
        assert_eq!(err.to_string(), "Embedding provider is disabled");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_at_call_time() {
        let embedder = OpenAIEmbedder::new(&EmbeddingConfig {
            api_key_env: "RAGCHAT_TEST_UNSET_KEY".to_string(),
            ..config("openai")
        })
        .unwrap();
        let err = embedder.embed(&["x".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("RAGCHAT_TEST_UNSET_KEY"));
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(parse_openai_response(&serde_json::json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_parse_ollama() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.25], [1.0, 2.0]]});
        assert_eq!(
            parse_ollama_response(&json).unwrap(),
            vec![vec![0.5, 0.25], vec![1.0, 2.0]]
        );
        assert!(parse_ollama_response(&serde_json::json!({"embeddings": [1]})).is_err());
    }

    #[test]
    fn test_check_dims() {
        assert!(check_dims(&[vec![0.0; 3]], 3, "m").is_ok());
        let err = check_dims(&[vec![0.0; 3], vec![0.0; 4]], 3, "m").unwrap_err();
        assert!(err.to_string().contains("4-dimensional"));
    }

    #[tokio::test]
    async fn test_openai_embedder_against_local_server() {
        use axum::{http::HeaderMap, routing::post, Json, Router};
        use std::sync::{Arc, Mutex};

        let seen: Arc<Mutex<Vec<(String, serde_json::Value)>>> = Arc::default();
        let recorder = Arc::clone(&seen);
        let app = Router::new().route(
            "/v1/embeddings",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let recorder = Arc::clone(&recorder);
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    recorder.lock().unwrap().push((auth, body));
                    // Deliberately out of order.
                    Json(serde_json::json!({
                        "data": [
                            {"index": 1, "embedding": [0.0, 1.0]},
                            {"index": 0, "embedding": [1.0, 0.0]}
                        ]
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        std::env::set_var("RAGCHAT_TEST_EMBED_KEY", "sk-local");
        let embedder = OpenAIEmbedder::new(&EmbeddingConfig {
            model: Some("tiny-embed".to_string()),
            dims: Some(2),
            url: Some(format!("http://{}/v1/", addr)),
            api_key_env: "RAGCHAT_TEST_EMBED_KEY".to_string(),
            max_retries: 0,
            ..config("openai")
        })
        .unwrap();

        let vectors = embedder
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Bearer sk-local");
        assert_eq!(seen[0].1["model"], "tiny-embed");
        assert_eq!(seen[0].1["input"], serde_json::json!(["first", "second"]));
    }
}
