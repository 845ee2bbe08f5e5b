//! Per-session outcome records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ChatTurn;
use crate::instrument::TestResult;

/// Outcome of one seed-topic conversation, persisted as one JSON file.
///
/// Immutable once written; `id` is sequential within the session's output
/// directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: u64,
    /// True iff the post-conversation total strictly exceeds the baseline.
    #[serde(rename = "degree_deepen")]
    pub deepened: bool,
    /// The seed topic that opened this conversation.
    pub initial_sentence: String,
    pub initial_test_score: TestResult,
    pub post_test_score: TestResult,
    pub chat_history: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Builds a record from pre/post results, deriving the deepening flag
    /// by strict comparison of the totals.
    pub fn new(
        id: u64,
        initial_sentence: impl Into<String>,
        initial_test_score: TestResult,
        post_test_score: TestResult,
        chat_history: Vec<ChatTurn>,
    ) -> Self {
        let deepened = post_test_score.total() > initial_test_score.total();
        Self {
            id,
            deepened,
            initial_sentence: initial_sentence.into(),
            initial_test_score,
            post_test_score,
            chat_history,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(entries: &[(&str, i64)]) -> TestResult {
        TestResult::Flat(entries.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn deepened_requires_strict_increase() {
        let record = SessionRecord::new(
            0,
            "I can't sleep anymore",
            flat(&[("1", 1), ("2", 1)]),
            flat(&[("1", 1), ("2", 2)]),
            vec![],
        );
        assert!(record.deepened);

        let equal = SessionRecord::new(
            1,
            "I can't sleep anymore",
            flat(&[("1", 1), ("2", 1)]),
            flat(&[("1", 2), ("2", 0)]),
            vec![],
        );
        assert!(!equal.deepened, "equal totals must not count as deepening");
    }

    #[test]
    fn serializes_with_stable_field_names() {
        let record = SessionRecord::new(3, "topic", flat(&[("1", 0)]), flat(&[("1", 1)]), vec![]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["degree_deepen"], true);
        assert_eq!(json["initial_sentence"], "topic");
        assert!(json["initial_test_score"].is_object());
    }
}
