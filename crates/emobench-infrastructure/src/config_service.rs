//! Loads the benchmark's input configuration from a config directory.
//!
//! Layout:
//!
//! ```text
//! config/
//! ├── disorder_configs.json        # question banks and score mappings
//! ├── character.json               # character registry (id + persona)
//! ├── CCD/{disorder}/patient{N}.json       # cognitive-conceptualization records
//! └── transcript/{disorder}/patient{N}.json # seed topics per patient
//! ```
//!
//! All of these are required inputs: a missing file is a hard error, and
//! no input directory is ever created here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use emobench_core::{
    CategorizedBank, Disorder, EmobenchError, Instrument, ItemBank, Result,
};

/// One character under test: backend id plus persona instruction text.
#[derive(Debug, Clone, Deserialize)]
pub struct CharacterEntry {
    pub id: String,
    pub msg: String,
}

/// One situation/thought/emotion/behavior tuple from a patient's
/// cognitive-conceptualization diagram.
#[derive(Debug, Clone, Deserialize)]
pub struct CognitiveModel {
    pub situation: String,
    pub automatic_thoughts: String,
    pub emotion: String,
    pub behavior: String,
}

/// A patient's cognitive-conceptualization record, the raw material for
/// the patient agent's system prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct PatientRecord {
    pub life_history: String,
    pub core_beliefs: String,
    pub core_belief_description: String,
    pub intermediate_beliefs: String,
    #[serde(
        alias = "intermediate_beliefs_during_depression",
        alias = "intermediate_beliefs_during_delusion",
        alias = "intermediate_beliefs_during_psychosis"
    )]
    pub intermediate_beliefs_during_disorder: String,
    pub coping_strategies: String,
    #[serde(default)]
    pub cognitive_models: Vec<CognitiveModel>,
}

/// Seed topics drawn from a patient's transcript.
#[derive(Debug, Clone)]
pub struct SeedTopics {
    /// The transcript's topic-group label.
    pub type_name: String,
    pub topics: Vec<String>,
}

#[derive(Deserialize)]
struct FlatInstrumentFile {
    test_type: String,
    #[serde(flatten)]
    bank: ItemBank,
}

#[derive(Deserialize)]
struct CategorizedInstrumentFile {
    test_type: String,
    #[serde(flatten)]
    bank: CategorizedBank,
}

#[derive(Deserialize)]
struct DisorderConfigsFile {
    depression: FlatInstrumentFile,
    delusion: FlatInstrumentFile,
    psychosis: CategorizedInstrumentFile,
}

#[derive(Deserialize)]
struct TranscriptEntry {
    description: String,
}

/// Read-only access to the benchmark configuration directory.
pub struct ConfigService {
    root: PathBuf,
}

impl ConfigService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads the scoring instrument for one disorder.
    pub fn load_instrument(&self, disorder: Disorder) -> Result<Instrument> {
        let configs: DisorderConfigsFile = self.read_json(Path::new("disorder_configs.json"))?;
        Ok(match disorder {
            Disorder::Depression => Instrument::Depression {
                test_type: configs.depression.test_type,
                bank: configs.depression.bank,
            },
            Disorder::Delusion => Instrument::Delusion {
                test_type: configs.delusion.test_type,
                bank: configs.delusion.bank,
            },
            Disorder::Psychosis => Instrument::Psychosis {
                test_type: configs.psychosis.test_type,
                bank: configs.psychosis.bank,
            },
        })
    }

    /// Loads the character registry, keyed by character name.
    pub fn load_characters(&self) -> Result<BTreeMap<String, CharacterEntry>> {
        self.read_json(Path::new("character.json"))
    }

    /// Loads one patient's cognitive-conceptualization record.
    pub fn load_patient_record(&self, disorder: Disorder, patient_id: u32) -> Result<PatientRecord> {
        let rel = PathBuf::from("CCD")
            .join(disorder.key())
            .join(format!("patient{patient_id}.json"));
        self.read_json(&rel)
    }

    /// Loads one patient's seed topics.
    ///
    /// The transcript file maps a single topic-group label to a list of
    /// {description} entries; the descriptions become the seed topics.
    pub fn load_seed_topics(&self, disorder: Disorder, patient_id: u32) -> Result<SeedTopics> {
        let rel = PathBuf::from("transcript")
            .join(disorder.key())
            .join(format!("patient{patient_id}.json"));
        let file: BTreeMap<String, Vec<TranscriptEntry>> = self.read_json(&rel)?;
        let (type_name, entries) = file.into_iter().next().ok_or_else(|| {
            EmobenchError::config(format!(
                "transcript for {disorder} patient{patient_id} has no topic group"
            ))
        })?;
        Ok(SeedTopics {
            type_name,
            topics: entries.into_iter().map(|e| e.description).collect(),
        })
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, rel: &Path) -> Result<T> {
        let path = self.root.join(rel);
        if !path.exists() {
            return Err(EmobenchError::not_found(
                "config file",
                path.display().to_string(),
            ));
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| EmobenchError::Serialization {
            format: "JSON".to_string(),
            message: format!("{}: {e}", path.display()),
        })
    }
}
