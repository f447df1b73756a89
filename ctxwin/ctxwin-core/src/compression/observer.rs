//! Observation hooks for the window manager.
//!
//! Trimming itself never logs. The manager reports what it does through a
//! [`WindowObserver`]; [`TracingObserver`] turns those reports into
//! `tracing` events and is the default.

use std::sync::Arc;

use super::estimator::ContextEstimate;
use super::window::WindowReport;

/// Callbacks for each step of a trim. All methods default to no-ops.
pub trait WindowObserver: Send + Sync {
    /// Called once per call with the estimate of the compressed input.
    fn on_start(&self, _messages: usize, _estimate: &ContextEstimate) {}

    /// Called when the input is over the ceiling and trimming begins.
    fn on_trim_start(&self, _system_messages: usize, _other_messages: usize, _allowed: usize) {}

    /// Called for each non-system message the recency walk looks at,
    /// newest first. `running` is the total before this message.
    fn on_message_considered(&self, _index: usize, _tokens: usize, _running: usize) {}

    /// Called when the emergency fallback replaces the trimmed suffix.
    fn on_fallback(&self, _tokens: usize, _kept_before: usize, _kept_after: usize) {}

    /// Called once with the final report.
    fn on_complete(&self, _report: &WindowReport) {}
}

/// Observer that drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl WindowObserver for NoopObserver {}

/// Observer that emits `tracing` events.
///
/// Progress goes to `debug`/`trace`, completed trims to `info` and the
/// emergency fallback to `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl WindowObserver for TracingObserver {
    fn on_start(&self, messages: usize, estimate: &ContextEstimate) {
        tracing::debug!(
            messages,
            system_tokens = estimate.system_tokens,
            conversation_tokens = estimate.conversation_tokens,
            usage_percent = estimate.usage_percent,
            "Estimated {} tokens for {} messages, limit {}",
            estimate.total_tokens,
            messages,
            estimate.context_window
        );
    }

    fn on_trim_start(&self, system_messages: usize, other_messages: usize, allowed: usize) {
        tracing::debug!(
            "Over limit, trimming: {} system messages, {} other messages, {} tokens allowed",
            system_messages,
            other_messages,
            allowed
        );
    }

    fn on_message_considered(&self, index: usize, tokens: usize, running: usize) {
        tracing::trace!(index, tokens, running, "Considering message");
    }

    fn on_fallback(&self, tokens: usize, kept_before: usize, kept_after: usize) {
        tracing::warn!(
            "Trimmed context still at {} tokens. Emergency fallback: keeping {} of {} recent messages.",
            tokens,
            kept_after,
            kept_before
        );
    }

    fn on_complete(&self, report: &WindowReport) {
        if report.dropped_messages() == 0 {
            tracing::debug!(state = ?report.state, "Context within budget");
            return;
        }
        tracing::info!(
            state = ?report.state,
            "Dropped {} of {} messages ({} -> {} tokens).",
            report.dropped_messages(),
            report.input_messages,
            report.tokens_before,
            report.tokens_after
        );
    }
}

impl<T: WindowObserver + ?Sized> WindowObserver for Arc<T> {
    fn on_start(&self, messages: usize, estimate: &ContextEstimate) {
        (**self).on_start(messages, estimate)
    }

    fn on_trim_start(&self, system_messages: usize, other_messages: usize, allowed: usize) {
        (**self).on_trim_start(system_messages, other_messages, allowed)
    }

    fn on_message_considered(&self, index: usize, tokens: usize, running: usize) {
        (**self).on_message_considered(index, tokens, running)
    }

    fn on_fallback(&self, tokens: usize, kept_before: usize, kept_after: usize) {
        (**self).on_fallback(tokens, kept_before, kept_after)
    }

    fn on_complete(&self, report: &WindowReport) {
        (**self).on_complete(report)
    }
}
