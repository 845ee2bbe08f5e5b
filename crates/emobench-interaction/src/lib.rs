//! LLM-facing agents and REST clients.
//!
//! The patient agent and the topic continuation manager drive the base
//! model through the [`CompletionBackend`](emobench_core::CompletionBackend)
//! seam; the two clients here are the production implementations of the
//! backend traits.

pub mod character_api;
pub mod openai_api;
pub mod patient_agent;
pub mod topic_manager;

pub use character_api::CharacterApiClient;
pub use openai_api::OpenAiCompletionClient;
pub use patient_agent::PatientAgent;
pub use topic_manager::{TopicDecision, TopicManager};

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use emobench_core::{ChatTurn, CompletionBackend, EmobenchError, Result};

    /// Completion backend that replays a fixed script of replies and
    /// records every request it receives.
    pub struct ScriptedCompletion {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<(String, Vec<ChatTurn>)>>,
    }

    impl ScriptedCompletion {
        pub fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn last_call(&self) -> Option<(String, Vec<ChatTurn>)> {
            self.calls.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedCompletion {
        async fn complete(&self, model: &str, messages: &[ChatTurn]) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), messages.to_vec()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| EmobenchError::internal("scripted completion exhausted"))
        }
    }
}
