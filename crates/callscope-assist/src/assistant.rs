//! Chat assistant
//!
//! Answers questions and drafts call coaching from scoped data only: every
//! row comes from the [`ScopedQueryBuilder`], and the prompt is assembled
//! by the [`ContextAssembler`] which rejects rows from any other scope.

use crate::context::{ContextAssembler, ContextError};
use crate::llm::{ChatMessage, ChatModel, ChatRequest, LlmError};
use callscope_access::{EffectiveScope, ScopedQueryBuilder};
use callscope_core::{CallId, Language, LlmConfig, QueryError};
use std::sync::Arc;

/// Assistant failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssistError {
    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("context rejected: {0}")]
    Context(#[from] ContextError),

    #[error("llm failed: {0}")]
    Llm(#[from] LlmError),
}

/// Assistant reply with the scope it was produced under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub scope: EffectiveScope,
    pub generation: u64,
}

/// Scope-bound chat assistant
pub struct Assistant {
    queries: Arc<ScopedQueryBuilder>,
    assembler: ContextAssembler,
    model: Arc<dyn ChatModel>,
    llm: LlmConfig,
    language: Language,
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("assembler", &self.assembler)
            .field("model", &self.llm.model)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl Assistant {
    #[must_use]
    pub fn new(
        queries: Arc<ScopedQueryBuilder>,
        assembler: ContextAssembler,
        model: Arc<dyn ChatModel>,
        llm: LlmConfig,
    ) -> Self {
        Self {
            queries,
            assembler,
            model,
            llm,
            language: Language::default(),
        }
    }

    /// Answer in `language`
    #[inline]
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Answer a free-form question about recent calls in scope
    pub async fn ask(&self, question: &str) -> Result<Answer, AssistError> {
        let limits = self.assembler.config();
        let (calls, feedback) = futures::try_join!(
            self.queries.recent_calls(limits.max_calls),
            self.queries.recent_feedback(limits.max_feedback),
        )?;

        let snapshot = self.queries.scope_store().current();
        let context = self.assembler.build_context(&snapshot, &calls, &feedback)?;
        let text = self.complete(context, question.trim().to_string()).await?;

        Ok(Answer {
            text,
            scope: snapshot.effective(),
            generation: snapshot.generation(),
        })
    }

    /// Draft coaching feedback for one call
    ///
    /// A call outside the active scope is reported as not found.
    pub async fn call_feedback(&self, call_id: CallId) -> Result<Answer, AssistError> {
        let (call, feedback) = futures::try_join!(
            self.queries.call(call_id),
            self.queries.feedback_for_call(call_id),
        )?;

        let snapshot = self.queries.scope_store().current();
        let context = self.assembler.build_call_context(&snapshot, &call, &feedback)?;
        let agent = self.assembler.truncate(&call.value().agent_name);
        let prompt = format!(
            "Write coaching feedback for agent {agent} on call {call_id}. \
             Start with what went well, then list each failed behavior with one \
             concrete suggestion."
        );
        let text = self.complete(context, prompt).await?;

        Ok(Answer {
            text,
            scope: snapshot.effective(),
            generation: snapshot.generation(),
        })
    }

    async fn complete(&self, mut system: String, prompt: String) -> Result<String, AssistError> {
        if self.language == Language::Es {
            system.push_str("\nRespond in Spanish.\n");
        }
        let request = ChatRequest::from_config(
            &self.llm,
            vec![ChatMessage::system(system), ChatMessage::user(prompt)],
        );
        let response = self.model.complete(&request).await?;
        let text = response
            .first_content()
            .map(str::to_string)
            .ok_or(LlmError::EmptyResponse)?;
        tracing::debug!(model = %request.model, chars = text.len(), "assistant answered");
        Ok(text)
    }
}
