//! A model call with a managed context window.
//!
//! [`Agent`] is the call site the window manager was built for: it puts the
//! system preamble in front of the conversation history, fits the result to
//! the budget and hands it to the model.
//!
//! # Example
//! ```ignore
//! use ctxwin::{AgentBuilder, ContextBudget};
//!
//! let agent = AgentBuilder::new(model)
//!     .preamble("You are a trip planning assistant.")
//!     .budget(ContextBudget::default().with_max_context_tokens(128_000))
//!     .build();
//!
//! let reply = agent.chat(history).await?;
//! ```

use crate::completion::{CompletionError, CompletionModel, Message};
use crate::compression::{ContextCompressor, ContextWindowManager};
use crate::config::ContextBudget;

pub struct AgentBuilder<M> {
    model: M,
    preamble: Option<String>,
    budget: ContextBudget,
}

impl<M: CompletionModel> AgentBuilder<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            preamble: None,
            budget: ContextBudget::default(),
        }
    }

    /// Set the system instructions sent ahead of every conversation.
    pub fn preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn budget(mut self, budget: ContextBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn build(self) -> Agent<M> {
        Agent {
            model: self.model,
            preamble: self.preamble,
            compressor: ContextWindowManager::new(self.budget),
        }
    }
}

/// A model paired with a preamble and a context compressor.
pub struct Agent<M, C = ContextWindowManager> {
    model: M,
    preamble: Option<String>,
    compressor: C,
}

impl<M, C> Agent<M, C>
where
    M: CompletionModel,
    C: ContextCompressor,
{
    /// Swap the context compressor, e.g. for a manager with another observer.
    pub fn with_compressor<D: ContextCompressor>(self, compressor: D) -> Agent<M, D> {
        Agent {
            model: self.model,
            preamble: self.preamble,
            compressor,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// The messages [`Agent::chat`] would send for `history`.
    pub fn prepare(&self, history: Vec<Message>) -> Vec<Message> {
        let messages = match &self.preamble {
            Some(preamble) => {
                let mut messages = Vec::with_capacity(history.len() + 1);
                messages.push(Message::system(preamble.as_str()));
                messages.extend(history);
                messages
            }
            None => history,
        };
        self.compressor.compress(messages)
    }

    /// Fit `history` to the budget and ask the model for the next message.
    ///
    /// Model errors are returned unchanged; nothing is retried.
    pub async fn chat(&self, history: Vec<Message>) -> Result<Message, CompletionError> {
        let messages = self.prepare(history);
        self.model.invoke(messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::Role;
    use crate::compression::NoopObserver;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingModel {
        calls: Mutex<Vec<Vec<Message>>>,
    }

    impl CompletionModel for RecordingModel {
        async fn invoke(&self, messages: Vec<Message>) -> Result<Message, CompletionError> {
            let reply = format!("saw {} messages", messages.len());
            self.calls.lock().unwrap().push(messages);
            Ok(Message::assistant(reply))
        }
    }

    struct FailingModel;

    impl CompletionModel for FailingModel {
        async fn invoke(&self, _messages: Vec<Message>) -> Result<Message, CompletionError> {
            Err(CompletionError::ProviderError("rate limited".into()))
        }
    }

    struct OfflineModel;

    impl CompletionModel for OfflineModel {
        async fn invoke(&self, _messages: Vec<Message>) -> Result<Message, CompletionError> {
            let err: Box<dyn std::error::Error + Send + Sync> = "connection reset".into();
            Err(err.into())
        }
    }

    #[tokio::test]
    async fn test_chat_prepends_preamble() {
        let agent = AgentBuilder::new(RecordingModel::default())
            .preamble("You are a pizza ordering assistant.")
            .build();

        let reply = agent
            .chat(vec![Message::user("One margherita, please.")])
            .await
            .unwrap();
        assert_eq!(reply.content.as_text(), Some("saw 2 messages"));

        let calls = agent.model().calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, Role::System);
        assert_eq!(
            calls[0][0].content.as_text(),
            Some("You are a pizza ordering assistant.")
        );
        assert_eq!(calls[0][1].role, Role::User);
    }

    #[tokio::test]
    async fn test_chat_trims_history() {
        let budget = ContextBudget::new(100).with_safety_buffer(20);
        let agent = AgentBuilder::new(RecordingModel::default())
            .preamble("Be brief.")
            .budget(budget)
            .build()
            .with_compressor(ContextWindowManager::new(budget).with_observer(NoopObserver));

        let history = vec![
            Message::user("x".repeat(400)),
            Message::assistant("y".repeat(400)),
            Message::user("latest question"),
        ];
        agent.chat(history).await.unwrap();

        let calls = agent.model().calls.lock().unwrap();
        let sent = &calls[0];
        assert_eq!(sent.len(), 2);
        assert!(sent[0].is_system());
        assert_eq!(sent[1].content.as_text(), Some("latest question"));
    }

    #[test]
    fn test_prepare_without_preamble() {
        let agent = AgentBuilder::new(RecordingModel::default()).build();
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        assert_eq!(agent.prepare(history.clone()), history);
    }

    #[test]
    fn test_model_error_passes_through() {
        let agent = AgentBuilder::new(FailingModel).preamble("rules").build();
        let result = tokio_test::block_on(agent.chat(vec![Message::user("hi")]));
        assert!(matches!(
            result,
            Err(CompletionError::ProviderError(message)) if message == "rate limited"
        ));
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let agent = AgentBuilder::new(OfflineModel).build();
        let err = agent.chat(vec![Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, CompletionError::RequestError(_)));
        assert_eq!(err.to_string(), "RequestError: connection reset");
    }
}
