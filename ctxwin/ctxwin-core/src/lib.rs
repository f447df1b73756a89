//! Token-budgeted context windows for LLM conversations.
//!
//! Before each model call, [`ContextWindowManager`] fits the conversation into
//! a [`ContextBudget`]: images are downgraded to low detail, the conversation
//! is estimated without a tokenizer, and the oldest non-system messages are
//! dropped until it fits. System instructions always survive, and the kept
//! history is always the most recent, uninterrupted part of the conversation.
//!
//! ```ignore
//! use ctxwin::{ContextBudget, ContextWindowManager, Message};
//!
//! let manager = ContextWindowManager::new(ContextBudget::from_env()?);
//! let window = manager.fit_with_report(vec![
//!     Message::system("You are a helpful assistant."),
//!     Message::user("Plan a weekend in Lisbon."),
//! ]);
//! if window.report.is_degraded() {
//!     tracing::warn!("history did not fit; answering from instructions only");
//! }
//! ```

pub mod agent;
pub mod completion;
pub mod compression;
pub mod config;

pub use agent::{Agent, AgentBuilder};
pub use completion::{
    CompletionError, CompletionModel, Content, ContentBlock, ImageDetail, ImageUrl, Message, Role,
    TextBlock,
};
pub use compression::{
    ContextCompressor, ContextEstimate, ContextWindowManager, TokenEstimator, TrimmedWindow,
    WindowObserver, WindowReport, WindowState,
};
pub use config::{BudgetError, ContextBudget};
