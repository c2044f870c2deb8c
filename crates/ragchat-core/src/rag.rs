//! Query pipeline: retrieve, compose, generate.
//!
//! [`RagChain`] borrows its collaborators for the duration of one call, so
//! the caller decides how the index and providers are shared (a lock in
//! the server, plain ownership in the CLI).

use tracing::debug;

use crate::conversation::recent_turns;
use crate::embedding::{embed_query, Embedder};
use crate::error::RagError;
use crate::index::VectorIndex;
use crate::llm::{GenerationRequest, LanguageModel};
use crate::models::{Answer, ConversationTurn, SourceRef};
use crate::prompt;

/// Tunables for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RagSettings {
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Conversation turns included in the prompt.
    pub history_turns: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            top_k: 4,
            history_turns: 6,
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

pub struct RagChain<'a> {
    embedder: &'a dyn Embedder,
    llm: &'a dyn LanguageModel,
    index: &'a dyn VectorIndex,
    settings: RagSettings,
}

impl<'a> RagChain<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        llm: &'a dyn LanguageModel,
        index: &'a dyn VectorIndex,
        settings: RagSettings,
    ) -> Self {
        Self {
            embedder,
            llm,
            index,
            settings,
        }
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Answer `question` using the index and the given history.
    ///
    /// Only the last `history_turns` entries of `history` reach the prompt.
    /// An empty index is not an error: the model is still asked, with an
    /// empty context, and the answer carries no sources.
    pub async fn answer(&self, question: &str, history: &[ConversationTurn]) -> Result<Answer, RagError> {
        let hits = if self.index.is_empty() {
            Vec::new()
        } else {
            let query = embed_query(self.embedder, question)
                .await
                .map_err(RagError::Embedding)?;
            self.index.search(&query, self.settings.top_k)?
        };

        debug!(
            retrieved = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "retrieval done"
        );

        let window = recent_turns(history, self.settings.history_turns);
        let request = GenerationRequest {
            messages: prompt::compose(question, &hits, window),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let answer = self
            .llm
            .generate(&request)
            .await
            .map_err(RagError::Generation)?;

        Ok(Answer {
            answer,
            sources: hits.iter().map(SourceRef::from_scored).collect(),
        })
    }
}
