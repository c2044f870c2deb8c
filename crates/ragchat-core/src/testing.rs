//! Deterministic language model stand-ins for tests.
//!
//! Pair them with [`crate::offline::HashingEmbedder`] to run the pipeline
//! without any external service.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::llm::{GenerationRequest, LanguageModel};

/// Replies with the system prompt it was given followed by the question,
/// so tests can assert on exactly what the model saw.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoModel;

#[async_trait]
impl LanguageModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        Ok(format!(
            "{}\n\nQuestion: {}",
            request.system_prompt().unwrap_or_default(),
            request.last_user_message().unwrap_or_default()
        ))
    }
}

/// Always fails, like an unreachable provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        bail!("connection refused")
    }
}
