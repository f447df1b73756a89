//! Fixed-length tail truncation.
//!
//! The last resort when an estimate-driven pass still overshoots: keep the
//! newest `keep` messages whatever they cost. It does not look at sizes, so
//! it always terminates with a small, bounded result.

use crate::completion::Message;

/// Keep only the newest `keep` messages, in their original order.
pub fn keep_tail(mut messages: Vec<Message>, keep: usize) -> Vec<Message> {
    let start = messages.len().saturating_sub(keep);
    messages.drain(..start);
    messages
}
