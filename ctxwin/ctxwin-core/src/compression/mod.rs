//! Context window management for LLM calls.
//!
//! This module decides which conversation messages are sent to the model on
//! each call. Messages are costed with a character-density estimate, images
//! are downgraded to low detail, and the oldest non-system history is dropped
//! until the conversation fits the token budget. System instructions are
//! never dropped.

mod estimator;
mod images;
mod observer;
mod sliding_window;
mod traits;
mod truncation;
mod window;

pub use estimator::{
    ContextEstimate, TokenEstimator, estimate_message_tokens, estimate_messages_tokens,
    estimate_tokens,
};
pub use images::{compress_all, compress_images};
pub use observer::{NoopObserver, TracingObserver, WindowObserver};
pub use sliding_window::{RecentWindow, select_recent};
pub use traits::ContextCompressor;
pub use truncation::keep_tail;
pub use window::{ContextWindowManager, TrimmedWindow, WindowReport, WindowState};
