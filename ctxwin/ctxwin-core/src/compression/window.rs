//! Budgeted context window management.
//!
//! [`ContextWindowManager`] prepares a conversation for a model call in three
//! stages: images are downgraded to low detail, the result is estimated, and
//! if it is over the ceiling the oldest non-system messages are dropped.
//!
//! System messages are always kept and always lead the output. The kept
//! non-system messages are a contiguous suffix of the input's non-system
//! messages, in their original order. Should the trimmed result still be over
//! the ceiling, an emergency fallback cuts the suffix to a fixed number of
//! messages.

use crate::completion::Message;
use crate::config::ContextBudget;

use super::estimator::{ContextEstimate, TokenEstimator};
use super::images::compress_all;
use super::observer::{TracingObserver, WindowObserver};
use super::sliding_window::select_recent;
use super::traits::ContextCompressor;
use super::truncation::keep_tail;

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// The input fit; nothing was dropped.
    UnderBudget,
    /// Old messages were dropped to fit the working budget.
    Trimmed,
    /// Trimming still overshot the ceiling and the fixed tail was applied.
    EmergencyFallback,
}

/// What a call did to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReport {
    pub state: WindowState,
    pub input_messages: usize,
    pub system_messages: usize,
    /// Non-system messages in the input.
    pub conversation_messages: usize,
    /// Non-system messages in the output.
    pub kept_messages: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    /// Working budget used for trimming decisions.
    pub allowed_tokens: usize,
}

impl WindowReport {
    pub fn output_messages(&self) -> usize {
        self.system_messages + self.kept_messages
    }

    pub fn dropped_messages(&self) -> usize {
        self.conversation_messages - self.kept_messages
    }

    /// True when there was history but none of it survived: the model will
    /// answer from system instructions alone.
    pub fn is_degraded(&self) -> bool {
        self.conversation_messages > 0 && self.kept_messages == 0
    }
}

/// Output of [`ContextWindowManager::fit_with_report`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedWindow {
    pub messages: Vec<Message>,
    pub report: WindowReport,
}

/// Fits conversations into a [`ContextBudget`].
///
/// Holds no per-conversation state; one manager can serve any number of
/// conversations concurrently.
///
/// # Example
/// ```ignore
/// use ctxwin::{ContextBudget, ContextWindowManager};
///
/// let manager = ContextWindowManager::new(ContextBudget::default());
/// let messages = manager.fit(history);
/// ```
#[derive(Debug, Clone)]
pub struct ContextWindowManager<O = TracingObserver> {
    budget: ContextBudget,
    estimator: TokenEstimator,
    observer: O,
}

impl Default for ContextWindowManager {
    fn default() -> Self {
        Self::new(ContextBudget::default())
    }
}

impl ContextWindowManager {
    pub fn new(budget: ContextBudget) -> Self {
        Self {
            estimator: TokenEstimator::from_budget(&budget),
            budget,
            observer: TracingObserver,
        }
    }
}

impl<O: WindowObserver> ContextWindowManager<O> {
    /// Replace the observer that receives progress reports.
    pub fn with_observer<P: WindowObserver>(self, observer: P) -> ContextWindowManager<P> {
        ContextWindowManager {
            budget: self.budget,
            estimator: self.estimator,
            observer,
        }
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Usage snapshot of `messages` against the hard ceiling.
    pub fn estimate(&self, messages: &[Message]) -> ContextEstimate {
        ContextEstimate::new(&self.estimator, messages, self.budget.max_context_tokens)
    }

    /// Fit `messages` into the budget.
    pub fn fit(&self, messages: Vec<Message>) -> Vec<Message> {
        self.fit_with_report(messages).messages
    }

    /// Fit `messages` into the budget and report what was done.
    pub fn fit_with_report(&self, messages: Vec<Message>) -> TrimmedWindow {
        let input_messages = messages.len();
        let messages = compress_all(messages);

        let estimate = self.estimate(&messages);
        self.observer.on_start(input_messages, &estimate);

        let allowed_tokens = self.budget.allowed_tokens();

        if estimate.fits() {
            let system_messages = messages.iter().filter(|m| m.is_system()).count();
            let conversation_messages = input_messages - system_messages;
            let report = WindowReport {
                state: WindowState::UnderBudget,
                input_messages,
                system_messages,
                conversation_messages,
                kept_messages: conversation_messages,
                tokens_before: estimate.total_tokens,
                tokens_after: estimate.total_tokens,
                allowed_tokens,
            };
            self.observer.on_complete(&report);
            return TrimmedWindow { messages, report };
        }

        let (system, mut conversation): (Vec<_>, Vec<_>) =
            messages.into_iter().partition(Message::is_system);
        let conversation_messages = conversation.len();
        self.observer
            .on_trim_start(system.len(), conversation_messages, allowed_tokens);

        let window = select_recent(
            &conversation,
            &self.estimator,
            estimate.system_tokens,
            allowed_tokens,
            |index, tokens, running| {
                self.observer.on_message_considered(index, tokens, running)
            },
        );
        let mut kept = conversation.split_off(window.start);

        let mut state = WindowState::Trimmed;
        let mut tokens_after = estimate.system_tokens.saturating_add(window.tokens);

        if tokens_after > self.budget.max_context_tokens {
            let kept_before = kept.len();
            kept = keep_tail(kept, self.budget.fallback_tail);
            self.observer
                .on_fallback(tokens_after, kept_before, kept.len());

            state = WindowState::EmergencyFallback;
            tokens_after = estimate
                .system_tokens
                .saturating_add(self.estimator.estimate_messages(&kept));
        }

        let report = WindowReport {
            state,
            input_messages,
            system_messages: system.len(),
            conversation_messages,
            kept_messages: kept.len(),
            tokens_before: estimate.total_tokens,
            tokens_after,
            allowed_tokens,
        };

        let mut messages = system;
        messages.extend(kept);

        self.observer.on_complete(&report);
        TrimmedWindow { messages, report }
    }
}

impl<O: WindowObserver> ContextCompressor for ContextWindowManager<O> {
    fn compress(&self, messages: Vec<Message>) -> Vec<Message> {
        self.fit(messages)
    }

    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        self.estimator.estimate_messages(messages)
    }

    fn token_limit(&self) -> usize {
        self.budget.max_context_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{ContentBlock, ImageDetail, ImageUrl, Role};
    use crate::compression::NoopObserver;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Text that estimates to exactly `tokens` with the default density.
    fn text(tokens: usize) -> String {
        "x".repeat(tokens * 4)
    }

    fn manager(max: usize, buffer: usize) -> ContextWindowManager<NoopObserver> {
        ContextWindowManager::new(
            ContextBudget::new(max)
                .with_safety_buffer(buffer)
                .with_max_image_tokens(50),
        )
        .with_observer(NoopObserver)
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl WindowObserver for Recorder {
        fn on_trim_start(&self, system: usize, other: usize, allowed: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("trim {system} {other} {allowed}"));
        }

        fn on_message_considered(&self, index: usize, tokens: usize, running: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("consider {index} {tokens} {running}"));
        }

        fn on_fallback(&self, tokens: usize, before: usize, after: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("fallback {tokens} {before} {after}"));
        }

        fn on_complete(&self, report: &WindowReport) {
            self.events
                .lock()
                .unwrap()
                .push(format!("complete {:?}", report.state));
        }
    }

    #[test]
    fn test_empty_input() {
        let result = manager(100, 20).fit_with_report(vec![]);
        assert!(result.messages.is_empty());
        assert_eq!(result.report.state, WindowState::UnderBudget);
        assert!(!result.report.is_degraded());
    }

    #[test]
    fn test_under_budget_is_unchanged() {
        let messages = vec![
            Message::system(text(50)),
            Message::user(text(30)),
            Message::assistant(text(30)),
        ];
        let result = manager(1_000, 100).fit_with_report(messages.clone());
        assert_eq!(result.messages, messages);
        assert_eq!(result.report.state, WindowState::UnderBudget);
        assert_eq!(result.report.tokens_before, 110);
        assert_eq!(result.report.tokens_after, 110);
        assert_eq!(result.report.dropped_messages(), 0);
    }

    #[test]
    fn test_exactly_at_ceiling_is_under_budget() {
        let messages = vec![Message::system(text(40)), Message::user(text(60))];
        let result = manager(100, 20).fit_with_report(messages.clone());
        assert_eq!(result.report.state, WindowState::UnderBudget);
        assert_eq!(result.messages, messages);
    }

    #[test]
    fn test_simple_trim_keeps_recent() {
        let recent = Message::user(text(10));
        let messages = vec![
            Message::system(text(30)),
            Message::user(text(60)),
            Message::assistant(text(60)),
            recent.clone(),
        ];

        let result = manager(100, 20).fit_with_report(messages.clone());
        assert_eq!(result.messages, vec![messages[0].clone(), recent]);
        assert_eq!(result.report.state, WindowState::Trimmed);
        assert_eq!(result.report.tokens_before, 160);
        assert_eq!(result.report.tokens_after, 40);
        assert_eq!(result.report.allowed_tokens, 80);
        assert_eq!(result.report.dropped_messages(), 2);
    }

    #[test]
    fn test_system_messages_lead_in_order() {
        let messages = vec![
            Message::system("first rules"),
            Message::user(text(70)),
            Message::system("second rules"),
            Message::assistant(text(5)),
            Message::user(text(5)),
        ];

        let result = manager(60, 10).fit(messages);
        let roles: Vec<_> = result.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::System, Role::Assistant, Role::User]
        );
        assert_eq!(result[0].content.as_text(), Some("first rules"));
        assert_eq!(result[1].content.as_text(), Some("second rules"));
    }

    #[test]
    fn test_older_small_message_not_kept_after_gap() {
        let messages = vec![
            Message::user(text(1)),
            Message::assistant(text(90)),
            Message::user(text(10)),
        ];
        let result = manager(100, 20).fit(messages.clone());
        assert_eq!(result, vec![messages[2].clone()]);
    }

    #[test]
    fn test_single_oversized_message_is_dropped() {
        let messages = vec![Message::system(text(10)), Message::user(text(500))];
        let result = manager(100, 20).fit_with_report(messages.clone());
        assert_eq!(result.messages, vec![messages[0].clone()]);
        assert_eq!(result.report.state, WindowState::Trimmed);
        assert!(result.report.is_degraded());
    }

    #[test]
    fn test_no_system_messages() {
        let messages = vec![
            Message::user(text(50)),
            Message::assistant(text(50)),
            Message::user(text(20)),
        ];
        let result = manager(100, 20).fit(messages.clone());
        assert_eq!(result, messages[1..].to_vec());
    }

    #[test]
    fn test_only_system_messages_over_budget() {
        let messages = vec![Message::system(text(80)), Message::system(text(80))];
        let result = manager(100, 20).fit_with_report(messages.clone());
        assert_eq!(result.messages, messages);
        assert_eq!(result.report.state, WindowState::EmergencyFallback);
        assert!(!result.report.is_degraded());
    }

    #[test]
    fn test_emergency_fallback_when_system_exceeds_ceiling() {
        let mut messages = vec![Message::system(text(150))];
        messages.extend((0..8).map(|_| Message::user(text(2))));

        let recorder = Arc::new(Recorder::default());
        let result = manager(100, 20)
            .with_observer(recorder.clone())
            .fit_with_report(messages.clone());

        assert_eq!(result.report.state, WindowState::EmergencyFallback);
        assert_eq!(result.messages, vec![messages[0].clone()]);
        assert!(result.report.kept_messages <= 5);
        assert_eq!(result.report.tokens_after, 150);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events[0], "trim 1 8 80");
        assert_eq!(events[1], "consider 7 2 150");
        assert_eq!(events[2], "fallback 150 0 0");
        assert_eq!(events[3], "complete EmergencyFallback");
    }

    #[test]
    fn test_images_downgraded_even_under_budget() {
        let messages = vec![
            Message::user(vec![
                ContentBlock::image_url("https://x.test/a.png"),
                ContentBlock::uploaded_image("abc"),
            ]),
        ];
        let result = manager(1_000, 0).fit(messages);
        let blocks = result[0].content.blocks();
        let low = ImageUrl::new("https://x.test/a.png").with_detail(ImageDetail::Low);
        assert_eq!(blocks[0], ContentBlock::ImageUrl(low));
        assert_eq!(blocks[1], ContentBlock::uploaded_image("abc"));
    }

    #[test]
    fn test_under_budget_wire_form_is_kept() {
        let raw = json!([
            {
                "role": "system",
                "content": [
                    { "type": "text", "text": "rules", "cache_control": { "type": "ephemeral" } }
                ]
            },
            {
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": "https://x.test/a.png",
                            "detail": "low",
                            "vendor": "acme"
                        },
                        "cache_control": { "type": "ephemeral" }
                    },
                    { "type": "image_url", "image_url": { "url": "file_id:abc", "detail": "high" } }
                ],
                "id": "msg-1"
            },
            { "role": "assistant", "content": { "refusal": null } }
        ]);
        let messages: Vec<Message> = serde_json::from_value(raw.clone()).unwrap();

        let result = manager(1_000, 0).fit_with_report(messages);
        assert_eq!(result.report.state, WindowState::UnderBudget);
        assert_eq!(serde_json::to_value(&result.messages).unwrap(), raw);
    }

    #[test]
    fn test_images_charged_flat_rate() {
        let image = || Message::user(vec![ContentBlock::image_url("https://x.test/a.png")]);
        let messages = vec![Message::system(text(10)), image(), image(), image()];

        // 10 + 3 * 50 = 160 > 120; allowed 100 fits system + one image.
        let result = manager(120, 20).fit_with_report(messages);
        assert_eq!(result.report.tokens_before, 160);
        assert_eq!(result.report.kept_messages, 1);
        assert_eq!(result.report.tokens_after, 60);
    }

    #[test]
    fn test_compressor_trait() {
        let manager = manager(100, 20);
        let small = vec![Message::user(text(10))];
        let large = vec![Message::user(text(101))];
        assert!(!manager.needs_compression(&small));
        assert!(manager.needs_compression(&large));
        assert_eq!(manager.token_limit(), 100);
        assert!(manager.compress(large).is_empty());
    }
}
