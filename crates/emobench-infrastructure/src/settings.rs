//! Runtime settings (`config.toml`).
//!
//! Holds the connection details for the two external services. Secrets can
//! be left out of the file and provided via environment variables instead
//! (`OPENAI_API_KEY`, `EMOBENCH_CHARACTER_TOKEN`).

use std::env;
use std::path::Path;

use serde::Deserialize;

use emobench_core::{EmobenchError, Result};

/// Character-backend connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharacterBackendSettings {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

/// Chat-completion backend settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub character_backend: CharacterBackendSettings,
    #[serde(default)]
    pub completion: CompletionSettings,
}

impl Settings {
    /// Loads settings from a TOML file; a missing file yields defaults so
    /// that environment-only setups work.
    pub fn load(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Completion API key from the file or `OPENAI_API_KEY`.
    pub fn completion_api_key(&self) -> Result<String> {
        self.completion
            .api_key
            .clone()
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                EmobenchError::config(
                    "completion api_key not set in config.toml and OPENAI_API_KEY unset",
                )
            })
    }

    /// Character-backend token from the file or `EMOBENCH_CHARACTER_TOKEN`.
    pub fn character_token(&self) -> Result<String> {
        self.character_backend
            .token
            .clone()
            .or_else(|| env::var("EMOBENCH_CHARACTER_TOKEN").ok())
            .ok_or_else(|| {
                EmobenchError::config(
                    "character_backend token not set in config.toml and EMOBENCH_CHARACTER_TOKEN unset",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("config.toml")).unwrap();
        assert!(settings.character_backend.base_url.is_none());
    }

    #[test]
    fn loads_partial_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[character_backend]\nbase_url = \"https://chars.example\"\ntoken = \"t0k\"\n",
        )
        .unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(
            settings.character_backend.base_url.as_deref(),
            Some("https://chars.example")
        );
        assert_eq!(settings.character_token().unwrap(), "t0k");
    }
}
