//! Callscope Assist - scope-bound AI assistance
//!
//! - Chat-completion wire types and the [`ChatModel`] seam
//! - [`OpenAiChat`] HTTPS client
//! - [`ContextAssembler`] turning scoped rows into a prompt
//! - [`Assistant`] for Q&A and call coaching
//!
//! # Example
//!
//! ```rust,ignore
//! use callscope_assist::prelude::*;
//!
//! let model = Arc::new(OpenAiChat::from_env(&config.llm)?);
//! let assistant = Assistant::new(queries, ContextAssembler::new(config.context.clone()), model, config.llm.clone());
//! let answer = assistant.ask("Which behaviors fail most often this week?").await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod assistant;
pub mod context;
pub mod llm;

pub use assistant::{Answer, AssistError, Assistant};
pub use context::{ContextAssembler, ContextError, NO_DATA_MARKER};
pub use llm::{
    ChatMessage, ChatModel, ChatRequest, ChatResponse, ChatRole, Choice, ChoiceMessage, LlmError,
    OpenAiChat,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the assistant
    pub use crate::{
        Answer, AssistError, Assistant, ChatModel, ContextAssembler, ContextError, OpenAiChat,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
