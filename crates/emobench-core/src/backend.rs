//! Seams toward the external model backends.
//!
//! The orchestrator and agents only ever see these traits; the concrete
//! REST clients live in the interaction crate and test doubles implement
//! them directly.

use async_trait::async_trait;

use crate::chat::ChatTurn;
use crate::error::Result;

/// A chat-completion backend (the "base model" driving the patient agent
/// and the topic judge).
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Runs one chat completion over the given messages and returns the
    /// model's text reply.
    async fn complete(&self, model: &str, messages: &[ChatTurn]) -> Result<String>;
}

/// An established chat session with the character backend.
#[derive(Debug, Clone)]
pub struct CharacterSession {
    pub chat_id: String,
    /// The character's opening message, if the backend sends one.
    pub greeting: Option<String>,
}

/// The roleplay chat service hosting the character under test.
///
/// `new_chat` and `send_message` may fail with a transient server
/// condition (`EmobenchError::Backend { transient: true, .. }`); callers
/// decide the retry policy.
#[async_trait]
pub trait CharacterBackend: Send + Sync {
    async fn new_chat(&self, character_id: &str) -> Result<CharacterSession>;

    async fn send_message(&self, character_id: &str, chat_id: &str, text: &str) -> Result<String>;

    /// Releases backend resources. Called once after all conversations of
    /// a run.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Call-accounting hook, invoked after every completion call with the
/// request messages, the output text, and the model identifier.
///
/// Keeps token/cost bookkeeping out of the agents; the application crate
/// provides a ledger implementation, tests and callers that do not care
/// use [`NullUsageObserver`].
pub trait UsageObserver: Send + Sync {
    fn record(&self, messages: &[ChatTurn], output: &str, model: &str);
}

/// Usage observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUsageObserver;

impl UsageObserver for NullUsageObserver {
    fn record(&self, _messages: &[ChatTurn], _output: &str, _model: &str) {}
}
