//! Fast token estimation without a tokenizer.
//!
//! Text is costed by character count against a fixed density, images at a
//! flat rate whatever their size or requested detail. The numbers are an
//! approximation; the only guarantee is monotonicity: more characters never
//! estimate to fewer tokens. Message costs are independent of each other, so
//! the cost of a list is the plain sum of its parts in any order.

use crate::completion::{Content, ContentBlock, Message};
use crate::config::{ContextBudget, DEFAULT_CHARS_PER_TOKEN, DEFAULT_MAX_IMAGE_TOKENS};

/// Character-density token estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    chars_per_token: f64,
    image_tokens: usize,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN, DEFAULT_MAX_IMAGE_TOKENS)
    }
}

impl TokenEstimator {
    pub fn new(chars_per_token: f64, image_tokens: usize) -> Self {
        Self {
            chars_per_token,
            image_tokens,
        }
    }

    pub fn from_budget(budget: &ContextBudget) -> Self {
        Self::new(budget.chars_per_token, budget.max_image_tokens)
    }

    /// Estimate token count for a text span.
    #[inline]
    pub fn estimate_text(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let tokens = (text.chars().count() as f64 / self.chars_per_token).ceil();
        // Zero or NaN density.
        if tokens.is_finite() {
            tokens as usize
        } else {
            usize::MAX
        }
    }

    pub fn estimate_block(&self, block: &ContentBlock) -> usize {
        match block {
            ContentBlock::Text(block) => self.estimate_text(&block.text),
            ContentBlock::ImageUrl(_) | ContentBlock::ImageHandle(_) => self.image_tokens,
            ContentBlock::Other(_) => 0,
        }
    }

    /// Estimate token count for a single message.
    pub fn estimate_message(&self, message: &Message) -> usize {
        match &message.content {
            Content::Text(text) => self.estimate_text(text),
            Content::Blocks(blocks) => blocks
                .iter()
                .map(|block| self.estimate_block(block))
                .fold(0, usize::saturating_add),
            Content::Other(_) => 0,
        }
    }

    /// Estimate token count for a sequence of messages.
    pub fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|message| self.estimate_message(message))
            .fold(0, usize::saturating_add)
    }
}

/// Estimate token count for a text string with the default density.
#[inline]
pub fn estimate_tokens(text: &str) -> usize {
    TokenEstimator::default().estimate_text(text)
}

/// Estimate token count for a single message with the default costs.
pub fn estimate_message_tokens(message: &Message) -> usize {
    TokenEstimator::default().estimate_message(message)
}

/// Estimate token count for a sequence of messages with the default costs.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    TokenEstimator::default().estimate_messages(messages)
}

/// Snapshot of how a message list uses a context window.
///
/// Splits the estimate into the system instructions and the rest of the
/// conversation, which is the split trimming works with.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEstimate {
    /// Tokens used by system-role messages
    pub system_tokens: usize,
    /// Tokens used by every other message
    pub conversation_tokens: usize,
    /// Total estimated tokens (sum of the above)
    pub total_tokens: usize,
    /// Context window size in tokens
    pub context_window: usize,
    /// Percentage of the context window used (0-100+)
    pub usage_percent: u32,
}

impl ContextEstimate {
    pub fn new(estimator: &TokenEstimator, messages: &[Message], context_window: usize) -> Self {
        let (system_tokens, conversation_tokens) =
            messages
                .iter()
                .fold((0usize, 0usize), |(system, conversation), message| {
                    let tokens = estimator.estimate_message(message);
                    if message.is_system() {
                        (system.saturating_add(tokens), conversation)
                    } else {
                        (system, conversation.saturating_add(tokens))
                    }
                });

        let total_tokens = system_tokens.saturating_add(conversation_tokens);
        let usage_percent = if context_window > 0 {
            let percent = (total_tokens as u128 * 100) / context_window as u128;
            u32::try_from(percent).unwrap_or(u32::MAX)
        } else {
            0
        };

        Self {
            system_tokens,
            conversation_tokens,
            total_tokens,
            context_window,
            usage_percent,
        }
    }

    /// Check if usage has reached a threshold percentage.
    pub fn needs_compression(&self, threshold_percent: u32) -> bool {
        self.usage_percent >= threshold_percent
    }

    /// Token count at a given percentage of the window.
    pub fn threshold_tokens(&self, threshold_percent: u32) -> usize {
        ((self.context_window as u128 * threshold_percent as u128) / 100) as usize
    }

    pub fn fits(&self) -> bool {
        self.total_tokens <= self.context_window
    }
}
