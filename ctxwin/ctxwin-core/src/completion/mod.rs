//! Conversation messages and the language-model seam.
//!
//! The model call itself lives outside this crate. [`CompletionModel`] is the
//! only thing the window manager's callers need from it: take the prepared
//! messages, return a reply.

pub mod message;

pub use message::{
    Content, ContentBlock, ImageDetail, ImageHandle, ImageUrl, Message, Role, TextBlock,
    UPLOAD_HANDLE_PREFIX,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    /// The request never produced a reply (transport, timeout, encoding)
    #[error("RequestError: {0}")]
    RequestError(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Error reported by the provider
    #[error("ProviderError: {0}")]
    ProviderError(String),
}

/// A hosted language model, seen as `invoke(messages) -> message`.
///
/// Retries, timeouts and backoff belong to implementations of this trait.
pub trait CompletionModel: Send + Sync {
    fn invoke(
        &self,
        messages: Vec<Message>,
    ) -> impl Future<Output = Result<Message, CompletionError>> + Send;
}
