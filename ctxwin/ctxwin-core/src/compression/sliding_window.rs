//! Recency window selection.
//!
//! Walks the conversation from the newest message back and keeps messages
//! while they fit under the working budget. The walk stops at the first
//! message that does not fit, so the kept messages are always a contiguous
//! suffix of the conversation: an older, smaller message is never kept once
//! a newer one has been dropped.

use crate::completion::Message;

use super::estimator::TokenEstimator;

/// Where the recency window starts and what it costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentWindow {
    /// Index of the oldest kept message; `len` when nothing fits.
    pub start: usize,
    /// Estimated tokens of the kept messages alone.
    pub tokens: usize,
}

/// Find the longest suffix of `conversation` that fits under `allowed`
/// tokens once `reserved` tokens (the system messages) are charged first.
///
/// `on_message` sees each considered message as `(index, tokens, running)`
/// before it is accepted or rejected, where `running` excludes the message.
pub fn select_recent<F>(
    conversation: &[Message],
    estimator: &TokenEstimator,
    reserved: usize,
    allowed: usize,
    mut on_message: F,
) -> RecentWindow
where
    F: FnMut(usize, usize, usize),
{
    let mut running = reserved;
    let mut start = conversation.len();

    for (index, message) in conversation.iter().enumerate().rev() {
        let tokens = estimator.estimate_message(message);
        on_message(index, tokens, running);

        match running.checked_add(tokens) {
            Some(next) if next <= allowed => {
                running = next;
                start = index;
            }
            _ => break,
        }
    }

    RecentWindow {
        start,
        tokens: running - reserved,
    }
}
