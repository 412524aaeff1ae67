// carecheck/src/config.rs
//!
//! Settings: model, summarization pre-pass and local store options.
//!
//! Resolution order: defaults, then the TOML file (explicit path or
//! `<config dir>/carecheck/config.toml`), then environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::chunk::DEFAULT_CHUNK_SIZE;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_SUMMARIZATION_INSTRUCTION: &str = "다음은 장기요양기관 평가 자료의 일부입니다. \
제공된 평가 지침과 관련된 핵심 사실(날짜, 수치, 서비스 제공 내역, 누락된 기록)만 빠짐없이 \
간결한 문장으로 추출하세요. 자료에 없는 내용은 추측하지 마세요.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub summarization: SummarizationSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub name: String,
    pub api_base: String,
    /// Kept low so the model extracts rather than improvises.
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: 0.1,
            max_output_tokens: 8192,
            timeout_secs: 120,
        }
    }
}

/// Optional pre-pass that condenses each evaluation file chunk by chunk
/// before the main analysis. Lossy: anything the summaries leave out is not
/// seen by the report request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationSettings {
    pub enabled: bool,
    pub chunk_size: usize,
    pub instruction: String,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            instruction: DEFAULT_SUMMARIZATION_INSTRUCTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Defaults to `<data dir>/carecheck/carecheck.sqlite`.
    pub database_path: Option<PathBuf>,
}

impl StoreSettings {
    pub fn resolved_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => {
                let data_dir = dirs::data_dir().context("Could not determine the data directory")?;
                Ok(data_dir.join("carecheck").join("carecheck.sqlite"))
            }
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location when `path`
    /// is `None` and that file exists. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let mut settings = match file {
            Some(path) => {
                debug!(path = %path.display(), "loading settings");
                let toml_str = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read settings from {:?}", path))?;
                Self::from_toml(&toml_str)
                    .with_context(|| format!("Failed to parse settings in {:?}", path))?
            }
            None => Settings::default(),
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("carecheck").join("config.toml"))
    }

    /// Applies `CARECHECK_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("CARECHECK_MODEL").filter(|v| !v.trim().is_empty()) {
            self.model.name = model.trim().to_string();
        }
        if let Some(path) = lookup("CARECHECK_DB_PATH").filter(|v| !v.trim().is_empty()) {
            self.store.database_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup("CARECHECK_SUMMARIZE") {
            self.summarization.enabled = matches!(flag.as_str(), "1" | "true" | "TRUE" | "True");
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.summarization.chunk_size == 0 {
            anyhow::bail!("summarization.chunk_size must be greater than zero");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            anyhow::bail!("model.temperature must be between 0.0 and 2.0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.model.name, DEFAULT_MODEL);
        assert!(!settings.summarization.enabled);
        assert_eq!(settings.summarization.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(settings.store.database_path.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let settings = Settings::from_toml(
            r#"
            [model]
            temperature = 0.3

            [summarization]
            enabled = true
            chunk_size = 4000
            "#,
        )?;
        assert_eq!(settings.model.temperature, 0.3);
        assert_eq!(settings.model.name, DEFAULT_MODEL);
        assert!(settings.summarization.enabled);
        assert_eq!(settings.summarization.chunk_size, 4000);
        assert_eq!(
            settings.summarization.instruction,
            DEFAULT_SUMMARIZATION_INSTRUCTION
        );
        Ok(())
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CARECHECK_MODEL", "gemini-2.5-pro"),
            ("CARECHECK_DB_PATH", "/tmp/cc.sqlite"),
            ("CARECHECK_SUMMARIZE", "1"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.model.name, "gemini-2.5-pro");
        assert_eq!(
            settings.store.database_path,
            Some(PathBuf::from("/tmp/cc.sqlite"))
        );
        assert!(settings.summarization.enabled);
    }

    #[test]
    fn test_load_explicit_file_and_validate() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        std::io::Write::write_all(&mut file, b"[summarization]\nchunk_size = 0\n")?;
        assert!(Settings::load(Some(file.path())).is_err());
        Ok(())
    }
}
