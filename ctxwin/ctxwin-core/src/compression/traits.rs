//! Core trait for context compression strategies.

use crate::completion::Message;

/// A strategy that shrinks a message list to fit a token budget.
///
/// Implementations own their budget and must be total: any well-formed
/// input yields a usable, possibly shorter, list. They keep message order
/// and never drop system instructions.
pub trait ContextCompressor: Send + Sync {
    /// Compress messages to fit within the budget.
    fn compress(&self, messages: Vec<Message>) -> Vec<Message>;

    /// Estimate the token count for a sequence of messages.
    fn estimate_tokens(&self, messages: &[Message]) -> usize;

    /// The hard ceiling this compressor enforces.
    fn token_limit(&self) -> usize;

    /// Check if compression would change anything beyond request shaping.
    fn needs_compression(&self, messages: &[Message]) -> bool {
        self.estimate_tokens(messages) > self.token_limit()
    }
}
