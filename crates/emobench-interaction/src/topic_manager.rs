//! Topic continuation decision protocol.
//!
//! Buffers recent patient utterances and, once enough have accumulated,
//! asks a judge model whether the current concern has been resolved. On a
//! "yes" it proposes the next seed topic from the remaining candidates.
//! Below the buffer threshold no model call happens at all; the check is
//! free.

use std::sync::Arc;

use tracing::{debug, warn};

use emobench_core::{ChatTurn, CompletionBackend, Result, UsageObserver};

pub const DEFAULT_BUFFER_SIZE: usize = 3;

const JUDGE_PROFILE: &str = "You are a dialog manager overseeing a conversation between a user and an AI agent. Your primary responsibility is to determine whether the problem or concern raised in the discussion has been resolved.
A problem is considered resolved if:
1. The user no longer conveys distress, frustration, or a sense of struggle regarding the issue.
2. The user demonstrates a shift in mindset or behavior, indicating growth or adaptation.
3. The user acknowledges the resolution, either by expressing appreciation, providing personal insights, or reflecting on their progress.

If the problem meets the criteria for resolution, introduce a new topic from the predefined list to maintain engagement and momentum.";

/// Verdict of one continuation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicDecision {
    /// Keep discussing the current topic.
    Continue,
    /// The concern is resolved; switch to this topic.
    Switch(String),
}

/// Judges topic resolution for one seed-topic conversation.
///
/// Owns the remaining candidate topics for that conversation; a topic
/// offered once is never offered again by the same manager instance.
pub struct TopicManager {
    current_topic: String,
    candidates: Vec<String>,
    buffer: Vec<String>,
    buffer_size: usize,
    model: String,
    completion: Arc<dyn CompletionBackend>,
    usage: Arc<dyn UsageObserver>,
}

impl TopicManager {
    pub fn new(
        initial_topic: &str,
        topic_list: &[String],
        buffer_size: usize,
        model: impl Into<String>,
        completion: Arc<dyn CompletionBackend>,
        usage: Arc<dyn UsageObserver>,
    ) -> Self {
        let candidates = topic_list
            .iter()
            .filter(|topic| topic.as_str() != initial_topic)
            .cloned()
            .collect();
        Self {
            current_topic: initial_topic.to_string(),
            candidates,
            buffer: Vec::new(),
            buffer_size,
            model: model.into(),
            completion,
            usage,
        }
    }

    pub fn current_topic(&self) -> &str {
        &self.current_topic
    }

    pub fn remaining_candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Buffers the latest patient utterance and, once the buffer is full,
    /// asks the judge whether to switch topics.
    ///
    /// The buffer is kept across "continue" verdicts and cleared on a
    /// switch. Unparseable judge output counts as "continue" so a
    /// misbehaving judge can never derail the conversation.
    pub async fn check_conversation(&mut self, latest_utterance: &str) -> Result<TopicDecision> {
        self.buffer.push(latest_utterance.to_string());
        if self.buffer.len() < self.buffer_size {
            return Ok(TopicDecision::Continue);
        }

        let messages = vec![
            ChatTurn::system(JUDGE_PROFILE),
            ChatTurn::user(self.judgment_prompt()),
        ];
        let output = self.completion.complete(&self.model, &messages).await?;
        self.usage.record(&messages, &output, &self.model);

        match parse_judgment(&output) {
            Some(topic) => {
                debug!(topic, "topic resolved, switching");
                self.buffer.clear();
                self.current_topic = topic.clone();
                self.candidates.retain(|candidate| candidate != &topic);
                Ok(TopicDecision::Switch(topic))
            }
            None => Ok(TopicDecision::Continue),
        }
    }

    fn judgment_prompt(&self) -> String {
        format!(
            r#"Here is the recent conversation history:

{history}

Assess the conversation and determine whether the **original problem or concern raised by the user has been resolved**.

If the issue is resolved, suggest the most natural next topic from the list below to continue the discussion:

{candidates}

Format your response strictly as:

y/n
Suggested next topic from the list if the answer above is "y"."#,
            history = self.buffer.join("\n"),
            candidates = self.candidates.join(", "),
        )
    }
}

/// Parses the strict two-line judgment. Returns the proposed topic on a
/// "y", `None` for "n" and for anything malformed.
fn parse_judgment(output: &str) -> Option<String> {
    let mut lines = output.lines().map(str::trim);
    match lines.next() {
        Some(first) if first.eq_ignore_ascii_case("y") => {
            let topic = lines.find(|line| !line.is_empty())?;
            Some(topic.to_string())
        }
        Some(first) if first.eq_ignore_ascii_case("n") => None,
        other => {
            warn!(?other, "unparseable topic judgment, treating as continue");
            None
        }
    }
}
