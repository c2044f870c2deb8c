//! Prompt composition.
//!
//! Builds the two-message prompt sent to the language model: a system
//! message holding the fixed instruction, the retrieved passages and the
//! recent conversation, and a user message holding the question.

use crate::llm::ChatMessage;
use crate::models::{ConversationTurn, ScoredChunk};

/// Phrase the model is told to use when the context does not answer the
/// question.
pub const INSUFFICIENT_INFORMATION: &str = "I don't have enough information about that";

/// Stand-in for the context block when retrieval found nothing.
pub const NO_CONTEXT: &str = "No relevant context found.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

const SYSTEM_TEMPLATE: &str = "You are a helpful document assistant powered by retrieval-augmented generation.

Your role is to:
1. Answer questions based on the provided context from uploaded documents
2. Be conversational and friendly
3. If the context doesn't contain relevant information, say so honestly
4. Keep responses concise but informative

When answering:
- Always base your answers on the provided context
- If the context is missing or unrelated, say \"{insufficient}\"
- Be helpful and suggest what information might be useful

Context from documents:
{context}";

/// Render retrieved chunks as numbered, source-tagged passages.
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT.to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, sc)| {
            format!(
                "[Document {} - {}]\n{}",
                i + 1,
                sc.chunk.document_name,
                sc.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Render conversation turns as a `Recent conversation:` block, or an
/// empty string when there is no history.
pub fn format_history(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return String::new();
    }
    let mut out = String::from("\nRecent conversation:\n");
    for turn in turns {
        out.push_str(turn.role.label());
        out.push_str(": ");
        out.push_str(&turn.text);
        out.push('\n');
    }
    out
}

/// The full system message for a query.
pub fn system_message(chunks: &[ScoredChunk], history: &[ConversationTurn]) -> String {
    let mut system = SYSTEM_TEMPLATE
        .replace("{insufficient}", INSUFFICIENT_INFORMATION)
        .replace("{context}", &format_context(chunks));
    system.push_str(&format_history(history));
    system
}

/// Compose the messages for one question.
///
/// `history` should already be trimmed to the window the caller wants the
/// model to see.
pub fn compose(question: &str, chunks: &[ScoredChunk], history: &[ConversationTurn]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_message(chunks, history)),
        ChatMessage::user(question),
    ]
}
