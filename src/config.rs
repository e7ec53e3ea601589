//! `.elgold.toml` configuration.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Command-line flags override what is loaded here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CorpusError, CorpusResult};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".elgold.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dataset directory.
    pub data: PathBuf,
    pub wikipedia: WikipediaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: PathBuf::from("data"),
            wikipedia: WikipediaConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, or defaults when the file is absent.
    pub fn load(path: &Path) -> CorpusResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CorpusResult<()> {
        if self.wikipedia.endpoint.is_empty() && self.wikipedia.language.trim().is_empty() {
            return Err(CorpusError::Config(
                "wikipedia.language or wikipedia.endpoint must be set".to_string(),
            ));
        }
        if self.wikipedia.batch_size == 0 {
            return Err(CorpusError::Config(
                "wikipedia.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WikipediaConfig {
    /// Language edition, e.g. `en` or `cs`.
    pub language: String,
    /// Explicit API URL; overrides `language` when non-empty.
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Titles per API request. The public API caps this at 50.
    pub batch_size: usize,
    pub user_agent: String,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            endpoint: String::new(),
            timeout_secs: 30,
            batch_size: 50,
            user_agent: format!("elgold/{} (dataset maintenance)", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl WikipediaConfig {
    pub fn api_url(&self) -> String {
        if self.endpoint.is_empty() {
            format!("https://{}.wikipedia.org/w/api.php", self.language.trim())
        } else {
            self.endpoint.clone()
        }
    }
}
