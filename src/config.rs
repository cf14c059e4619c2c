use crate::error::ConfigError;
use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf};

/// Default Gemini model used for extraction. Overridable via the
/// `model` key in the config file.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro-exp-03-25";

/// Delay between documents, to stay under the service's rate limits.
const DEFAULT_PACING_MS: u64 = 1500;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Gemini API key. The `GEMINI_API_KEY` env var takes precedence
    /// over this value when set.
    #[serde(default)]
    pub api_key: String,
    /// Folder holding the receipt PDFs to process.
    pub source_dir: PathBuf,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_pacing_ms() -> u64 {
    DEFAULT_PACING_MS
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, env::var("GEMINI_API_KEY").ok())
    }

    /// Parse and validate config content, with an optional credential
    /// override (the env var in production, a literal in tests).
    fn from_toml(content: &str, key_override: Option<String>) -> Result<Self, ConfigError> {
        let mut cfg: Config = toml::from_str(content)?;
        if let Some(key) = key_override.filter(|k| !k.is_empty()) {
            cfg.api_key = key;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fatal precondition check, run once before any document is touched.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Missing("api_key (or GEMINI_API_KEY env var)"));
        }
        if !self.source_dir.is_dir() {
            return Err(ConfigError::SourceDirMissing(self.source_dir.clone()));
        }
        Ok(())
    }
}
