use std::sync::Arc;

use inbox_domain::LanguageModelPort;
use inbox_error::InboxError;
use tracing::info;

use crate::prompt::{
    answer_context, answer_prompt, highlights_context, highlights_prompt, CONTEXT_CHAR_LIMIT,
};
use crate::vector::VectorStore;

pub const NO_RELEVANT_EMAILS: &str =
    "I couldn't find any relevant emails to answer your question.";
pub const NO_IMPORTANT_EMAILS: &str = "No particularly important emails found recently.";
pub const IMPORTANT_QUERY: &str = "urgent important deadline meeting action required";

pub const ANSWER_TOP_K: usize = 5;
pub const HIGHLIGHTS_TOP_K: usize = 10;

/// Retrieval-augmented answering over the stored emails.
pub struct AnswerPipeline {
    store: Arc<VectorStore>,
    llm: Arc<dyn LanguageModelPort>,
    context_chars: usize,
}

impl AnswerPipeline {
    pub fn new(store: Arc<VectorStore>, llm: Arc<dyn LanguageModelPort>) -> Self {
        Self {
            store,
            llm,
            context_chars: CONTEXT_CHAR_LIMIT,
        }
    }

    pub fn with_context_chars(mut self, context_chars: usize) -> Self {
        self.context_chars = context_chars;
        self
    }

    pub async fn answer(&self, query: &str) -> Result<String, InboxError> {
        info!(query, "processing chat query");
        let docs = self.store.query_similar(query, ANSWER_TOP_K).await?;
        if docs.is_empty() {
            return Ok(NO_RELEVANT_EMAILS.to_string());
        }

        let context = answer_context(&docs, self.context_chars);
        let answer = self.llm.complete(&answer_prompt(&context, query)).await?;
        info!(sources = docs.len(), chars = answer.len(), "answered query");
        Ok(answer)
    }

    pub async fn important_emails(&self) -> Result<String, InboxError> {
        let docs = self
            .store
            .query_similar(IMPORTANT_QUERY, HIGHLIGHTS_TOP_K)
            .await?;
        if docs.is_empty() {
            return Ok(NO_IMPORTANT_EMAILS.to_string());
        }

        let context = highlights_context(&docs);
        let summary = self.llm.complete(&highlights_prompt(&context)).await?;
        info!(candidates = docs.len(), "generated highlights");
        Ok(summary)
    }
}
