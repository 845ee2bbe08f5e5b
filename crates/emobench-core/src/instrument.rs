//! Scoring instruments for the three questionnaires.
//!
//! Each disorder is measured with its own instrument: PHQ-9 for depression
//! (flat item scores), PDI for delusion (three named sub-scores per item),
//! PANSS for psychosis (items grouped into positive/negative/general
//! symptom categories and administered one question at a time). The
//! instrument converts raw test results into a numeric total and a
//! human-readable transcript.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::disorder::Disorder;
use crate::error::{EmobenchError, Result};

const UNKNOWN_SCORE: &str = "Unknown score";

/// PANSS symptom categories, in administration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymptomCategory {
    Positive,
    Negative,
    General,
}

impl SymptomCategory {
    /// Fixed administration and formatting order.
    pub const ALL: [SymptomCategory; 3] = [
        SymptomCategory::Positive,
        SymptomCategory::Negative,
        SymptomCategory::General,
    ];

    /// Key used in the disorder configuration file.
    pub fn config_key(&self) -> &'static str {
        match self {
            SymptomCategory::Positive => "P",
            SymptomCategory::Negative => "N",
            SymptomCategory::General => "G",
        }
    }

    /// Section header in the formatted transcript.
    pub fn header(&self) -> &'static str {
        match self {
            SymptomCategory::Positive => "positive symptoms:",
            SymptomCategory::Negative => "negative symptoms:",
            SymptomCategory::General => "general symptoms:",
        }
    }
}

/// The three named sub-scores of one delusion (PDI) item.
///
/// Serialized with the `score1`/`score2`/`score3` keys the model is
/// prompted to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    #[serde(rename = "score1")]
    pub distress: i64,
    #[serde(rename = "score2")]
    pub preoccupation: i64,
    #[serde(rename = "score3")]
    pub conviction: i64,
}

impl SubScores {
    pub fn sum(&self) -> i64 {
        self.distress + self.preoccupation + self.conviction
    }
}

/// A raw questionnaire result as produced by the patient model.
///
/// Depression and psychosis results are flat item-key to score mappings;
/// delusion results carry three sub-scores per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestResult {
    Nested(BTreeMap<String, SubScores>),
    Flat(BTreeMap<String, i64>),
}

impl TestResult {
    /// Parses model output into the result shape expected for `disorder`.
    ///
    /// Flat shapes keep only all-digit keys with integer-valued scores
    /// (integer-looking strings are accepted); anything else the model
    /// volunteered alongside is dropped. An empty result is invalid.
    pub fn from_json_str(disorder: Disorder, text: &str) -> Result<TestResult> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| EmobenchError::InvalidTestResult(format!("JSON decoding error: {e}")))?;
        let result = match disorder {
            Disorder::Depression | Disorder::Psychosis => {
                let object = value.as_object().ok_or_else(|| {
                    EmobenchError::InvalidTestResult("expected a JSON object of item scores".into())
                })?;
                let mut scores = BTreeMap::new();
                for (key, value) in object {
                    if !is_all_digits(key) {
                        continue;
                    }
                    if let Some(score) = as_integer(value) {
                        scores.insert(key.clone(), score);
                    }
                }
                TestResult::Flat(scores)
            }
            Disorder::Delusion => {
                let items: BTreeMap<String, SubScores> =
                    serde_json::from_value(value).map_err(|e| {
                        EmobenchError::InvalidTestResult(format!(
                            "expected per-item sub-scores: {e}"
                        ))
                    })?;
                TestResult::Nested(items)
            }
        };
        if result.is_empty() {
            return Err(EmobenchError::InvalidTestResult(
                "model returned an empty result".into(),
            ));
        }
        Ok(result)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TestResult::Flat(scores) => scores.is_empty(),
            TestResult::Nested(items) => items.is_empty(),
        }
    }

    /// Numeric total of the result.
    ///
    /// Flat results sum the scores of all-digit item keys; nested results
    /// sum every item's sub-score sum.
    pub fn total(&self) -> i64 {
        match self {
            TestResult::Flat(scores) => scores
                .iter()
                .filter(|(key, _)| is_all_digits(key))
                .map(|(_, score)| *score)
                .sum(),
            TestResult::Nested(items) => items.values().map(SubScores::sum).sum(),
        }
    }
}

fn is_all_digits(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_digit())
}

fn as_integer(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// One PANSS question with its own severity labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleItem {
    pub question: String,
    pub score_mapping: BTreeMap<String, String>,
}

/// Question bank for the flat instruments (PHQ-9, PDI): numbered questions
/// sharing one score-to-label mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemBank {
    pub questions: BTreeMap<String, String>,
    pub score_mapping: BTreeMap<String, String>,
    pub test_msg: String,
}

/// Question bank for PANSS: per-category items, each with its own
/// score mapping, plus the one-question-at-a-time prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedBank {
    pub questions: BTreeMap<String, BTreeMap<String, ScaleItem>>,
    pub test_msg: String,
}

impl CategorizedBank {
    /// Items in administration order: categories in P/N/G order, items
    /// within a category by their numeric suffix (G2 before G10).
    pub fn ordered_items(&self) -> Vec<(SymptomCategory, &str, &ScaleItem)> {
        let mut ordered = Vec::new();
        for category in SymptomCategory::ALL {
            let Some(items) = self.questions.get(category.config_key()) else {
                continue;
            };
            for key in sorted_by_numeric_suffix(items.keys()) {
                ordered.push((category, key.as_str(), &items[key]));
            }
        }
        ordered
    }
}

/// One disorder's questionnaire with its scoring strategy.
#[derive(Debug, Clone)]
pub enum Instrument {
    Depression { test_type: String, bank: ItemBank },
    Delusion { test_type: String, bank: ItemBank },
    Psychosis { test_type: String, bank: CategorizedBank },
}

impl Instrument {
    pub fn disorder(&self) -> Disorder {
        match self {
            Instrument::Depression { .. } => Disorder::Depression,
            Instrument::Delusion { .. } => Disorder::Delusion,
            Instrument::Psychosis { .. } => Disorder::Psychosis,
        }
    }

    /// Display name of the scale (PHQ-9, PDI, PANSS).
    pub fn test_type(&self) -> &str {
        match self {
            Instrument::Depression { test_type, .. }
            | Instrument::Delusion { test_type, .. }
            | Instrument::Psychosis { test_type, .. } => test_type,
        }
    }

    /// The prompt used to administer the test. For psychosis this is a
    /// per-question template with `{question}` and `{score_mapping}`
    /// placeholders; for the other instruments it is sent verbatim.
    pub fn test_msg(&self) -> &str {
        match self {
            Instrument::Depression { bank, .. } | Instrument::Delusion { bank, .. } => {
                &bank.test_msg
            }
            Instrument::Psychosis { bank, .. } => &bank.test_msg,
        }
    }

    /// Renders a result as the human-readable transcript shown back to the
    /// patient model before the post test. Unmapped scores render as
    /// "Unknown score" rather than failing.
    pub fn format(&self, result: &TestResult) -> String {
        match self {
            Instrument::Depression { bank, .. } => format_depression(bank, result),
            Instrument::Delusion { bank, .. } => format_delusion(bank, result),
            Instrument::Psychosis { bank, .. } => format_psychosis(bank, result),
        }
    }
}

fn label<'a>(mapping: &'a BTreeMap<String, String>, score: Option<i64>) -> &'a str {
    score
        .and_then(|s| mapping.get(&s.to_string()))
        .map(String::as_str)
        .unwrap_or(UNKNOWN_SCORE)
}

fn format_depression(bank: &ItemBank, result: &TestResult) -> String {
    let scores = match result {
        TestResult::Flat(scores) => Some(scores),
        TestResult::Nested(_) => None,
    };
    let mut lines = Vec::new();
    for key in sorted_numerically(bank.questions.keys()) {
        let score = scores.and_then(|s| s.get(key)).copied();
        let answer = label(&bank.score_mapping, score);
        lines.push(format!("{key}. {}:  -{answer}", bank.questions[key]));
    }
    lines.join("\n")
}

fn format_delusion(bank: &ItemBank, result: &TestResult) -> String {
    let items = match result {
        TestResult::Nested(items) => Some(items),
        TestResult::Flat(_) => None,
    };
    let mut lines = Vec::new();
    for key in sorted_numerically(bank.questions.keys()) {
        lines.push(format!("{key}. {}: ", bank.questions[key]));
        let sub = items.and_then(|i| i.get(key));
        let distress = label(&bank.score_mapping, sub.map(|s| s.distress));
        let preoccupation = label(&bank.score_mapping, sub.map(|s| s.preoccupation));
        let conviction = label(&bank.score_mapping, sub.map(|s| s.conviction));
        lines.push(format!(
            "-these beliefs or experiences are {distress} distressing"
        ));
        lines.push(format!("-{preoccupation} think about them"));
        lines.push(format!("-{conviction} believe them to be true"));
    }
    lines.join("\n")
}

fn format_psychosis(bank: &CategorizedBank, result: &TestResult) -> String {
    let scores = match result {
        TestResult::Flat(scores) => Some(scores),
        TestResult::Nested(_) => None,
    };
    let mut lines = Vec::new();
    let mut index = 1;
    let mut current_category = None;
    for (category, key, item) in bank.ordered_items() {
        if current_category != Some(category) {
            lines.push(category.header().to_string());
            current_category = Some(category);
        }
        let score = scores.and_then(|s| s.get(&index.to_string())).copied();
        let answer = label(&item.score_mapping, score);
        lines.push(format!("{key}. {}:  -{answer}", item.question));
        index += 1;
    }
    lines.join("\n")
}

/// Sorts keys by integer value, non-numeric keys last.
fn sorted_numerically<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<&'a String> {
    let mut keys: Vec<&String> = keys.collect();
    keys.sort_by_key(|k| k.parse::<u64>().unwrap_or(u64::MAX));
    keys
}

/// Sorts keys like "G2"/"G10" by their numeric suffix.
fn sorted_by_numeric_suffix<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<&'a String> {
    let mut keys: Vec<&String> = keys.collect();
    keys.sort_by_key(|k| {
        let digits: String = k.chars().filter(|c| c.is_ascii_digit()).collect();
        digits.parse::<u64>().unwrap_or(u64::MAX)
    });
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(entries: &[(&str, i64)]) -> TestResult {
        TestResult::Flat(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        )
    }

    fn depression_instrument() -> Instrument {
        let mut questions = BTreeMap::new();
        questions.insert("1".into(), "Little interest or pleasure".into());
        questions.insert("2".into(), "Feeling down or hopeless".into());
        questions.insert("3".into(), "Trouble sleeping".into());
        let mut score_mapping = BTreeMap::new();
        score_mapping.insert("0".into(), "Not at all".into());
        score_mapping.insert("1".into(), "Several days".into());
        score_mapping.insert("2".into(), "More than half the days".into());
        Instrument::Depression {
            test_type: "PHQ-9".into(),
            bank: ItemBank {
                questions,
                score_mapping,
                test_msg: "Complete the PHQ-9.".into(),
            },
        }
    }

    #[test]
    fn flat_total_sums_digit_keys() {
        let result = flat(&[("1", 0), ("2", 1), ("3", 2)]);
        assert_eq!(result.total(), 3);
    }

    #[test]
    fn flat_total_ignores_non_digit_keys() {
        let mut scores = BTreeMap::new();
        scores.insert("1".to_string(), 2);
        scores.insert("comment".to_string(), 99);
        assert_eq!(TestResult::Flat(scores).total(), 2);
    }

    #[test]
    fn nested_total_sums_sub_scores() {
        let mut items = BTreeMap::new();
        items.insert(
            "item1".to_string(),
            SubScores {
                distress: 2,
                preoccupation: 1,
                conviction: 3,
            },
        );
        assert_eq!(TestResult::Nested(items).total(), 6);
    }

    #[test]
    fn parse_flat_keeps_only_digit_keyed_integers() {
        let result = TestResult::from_json_str(
            Disorder::Depression,
            r#"{"1": 2, "2": "1", "note": "felt tired"}"#,
        )
        .unwrap();
        assert_eq!(result, flat(&[("1", 2), ("2", 1)]));
    }

    #[test]
    fn parse_rejects_empty_result() {
        let err = TestResult::from_json_str(Disorder::Depression, "{}").unwrap_err();
        assert!(matches!(err, EmobenchError::InvalidTestResult(_)));
    }

    #[test]
    fn parse_rejects_malformed_json() {
        let err = TestResult::from_json_str(Disorder::Delusion, "not json").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn parse_nested_requires_sub_scores() {
        let result = TestResult::from_json_str(
            Disorder::Delusion,
            r#"{"1": {"score1": 2, "score2": 1, "score3": 3}}"#,
        )
        .unwrap();
        assert_eq!(result.total(), 6);
        assert!(TestResult::from_json_str(Disorder::Delusion, r#"{"1": 3}"#).is_err());
    }

    #[test]
    fn format_renders_labels_and_unknown_scores() {
        let instrument = depression_instrument();
        let result = flat(&[("1", 0), ("2", 1), ("3", 7)]);
        let text = instrument.format(&result);
        assert!(text.contains("1. Little interest or pleasure:  -Not at all"));
        assert!(text.contains("2. Feeling down or hopeless:  -Several days"));
        assert!(text.contains("3. Trouble sleeping:  -Unknown score"));
    }

    #[test]
    fn format_is_idempotent() {
        let instrument = depression_instrument();
        let result = flat(&[("1", 2), ("2", 0), ("3", 1)]);
        assert_eq!(instrument.format(&result), instrument.format(&result));
    }

    #[test]
    fn delusion_format_renders_three_clauses() {
        let mut questions = BTreeMap::new();
        questions.insert("1".into(), "Do you ever feel as if you are being persecuted?".into());
        let mut score_mapping = BTreeMap::new();
        score_mapping.insert("2".into(), "somewhat".into());
        score_mapping.insert("1".into(), "rarely".into());
        score_mapping.insert("3".into(), "strongly".into());
        let instrument = Instrument::Delusion {
            test_type: "PDI".into(),
            bank: ItemBank {
                questions,
                score_mapping,
                test_msg: String::new(),
            },
        };
        let mut items = BTreeMap::new();
        items.insert(
            "1".to_string(),
            SubScores {
                distress: 2,
                preoccupation: 1,
                conviction: 3,
            },
        );
        let text = instrument.format(&TestResult::Nested(items));
        assert!(text.contains("-these beliefs or experiences are somewhat distressing"));
        assert!(text.contains("-rarely think about them"));
        assert!(text.contains("-strongly believe them to be true"));
    }

    fn psychosis_instrument() -> Instrument {
        let item = |question: &str| ScaleItem {
            question: question.into(),
            score_mapping: BTreeMap::from([
                ("1".to_string(), "absent".to_string()),
                ("2".to_string(), "minimal".to_string()),
            ]),
        };
        let mut questions = BTreeMap::new();
        questions.insert(
            "P".to_string(),
            BTreeMap::from([
                ("P1".to_string(), item("Delusions")),
                ("P2".to_string(), item("Conceptual disorganization")),
            ]),
        );
        questions.insert(
            "N".to_string(),
            BTreeMap::from([("N1".to_string(), item("Blunted affect"))]),
        );
        questions.insert(
            "G".to_string(),
            BTreeMap::from([
                ("G2".to_string(), item("Anxiety")),
                ("G10".to_string(), item("Disorientation")),
            ]),
        );
        Instrument::Psychosis {
            test_type: "PANSS".into(),
            bank: CategorizedBank {
                questions,
                test_msg: "Rate: {question} using {score_mapping}".into(),
            },
        }
    }

    #[test]
    fn psychosis_items_keep_category_then_numeric_order() {
        let Instrument::Psychosis { bank, .. } = psychosis_instrument() else {
            unreachable!()
        };
        let keys: Vec<&str> = bank.ordered_items().iter().map(|(_, k, _)| *k).collect();
        assert_eq!(keys, vec!["P1", "P2", "N1", "G2", "G10"]);
    }

    #[test]
    fn psychosis_format_groups_under_headers() {
        let instrument = psychosis_instrument();
        let result = flat(&[("1", 1), ("2", 2), ("3", 1), ("4", 2), ("5", 9)]);
        let text = instrument.format(&result);
        let positive = text.find("positive symptoms:").unwrap();
        let negative = text.find("negative symptoms:").unwrap();
        let general = text.find("general symptoms:").unwrap();
        assert!(positive < negative && negative < general);
        assert!(text.contains("P1. Delusions:  -absent"));
        assert!(text.contains("G10. Disorientation:  -Unknown score"));
    }
}
