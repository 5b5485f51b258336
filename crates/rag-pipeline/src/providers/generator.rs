//! LLM generation trait

use async_trait::async_trait;

use crate::error::Result;

/// Answers a question given ranked context passages
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the complete answer text; streamed responses are collected first
    async fn generate(&self, question: &str, contexts: &[String]) -> Result<String>;

    fn name(&self) -> &str;
}

/// Prompt text sent to the model: contexts in ranked order, then the question
pub fn compose_prompt(question: &str, contexts: &[String]) -> String {
    if contexts.is_empty() {
        return question.to_string();
    }
    format!(
        "Context:\n{}\n\nQuestion:\n{}",
        contexts.join("\n\n"),
        question
    )
}
