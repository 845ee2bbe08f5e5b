//! Disorder taxonomy.
//!
//! Each benchmarked disorder carries its own questionnaire shape and
//! administration protocol; dispatch happens over this enum rather than
//! over raw config keys.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// The psychiatric conditions the harness can simulate and score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Disorder {
    /// PHQ-9 scale, flat item-to-score questionnaire.
    Depression,
    /// PDI scale, three named sub-scores per item.
    Delusion,
    /// PANSS scale, administered one question at a time across three
    /// symptom categories.
    Psychosis,
}

impl Disorder {
    /// Directory/config key for this disorder.
    pub fn key(&self) -> &'static str {
        match self {
            Disorder::Depression => "depression",
            Disorder::Delusion => "delusion",
            Disorder::Psychosis => "psychosis",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_lowercase_names() {
        assert_eq!(Disorder::from_str("depression").unwrap(), Disorder::Depression);
        assert_eq!(Disorder::from_str("psychosis").unwrap(), Disorder::Psychosis);
        assert!(Disorder::from_str("mania").is_err());
    }

    #[test]
    fn displays_as_key() {
        assert_eq!(Disorder::Delusion.to_string(), "delusion");
        assert_eq!(Disorder::Delusion.key(), "delusion");
    }
}
