//! Configuration parsing for scriptura.toml files
//!
//! ```toml
//! [reference]
//! he_said_text = "dit-il."
//! word_separator = " "
//!
//! [reference.backing]
//! he_said_text = "he said."
//!
//! [replay]
//! match_unchunked_blocks = false
//! ```
//!
//! Every key is optional; missing ones take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::reference::ReferenceLanguageSettings;
use crate::replay::ReplayOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScripturaConfig {
    /// The reference language used for alignment and "he said" insertion
    pub reference: ReferenceLanguageSettings,

    /// How user decisions are replayed onto a re-parsed book
    pub replay: ReplayOptions,
}

impl ScripturaConfig {
    /// Parse configuration from TOML content
    ///
    /// # Example
    ///
    /// ```
    /// use scriptura_core::ScripturaConfig;
    ///
    /// let config = ScripturaConfig::from_toml_str(r#"
    /// [reference]
    /// he_said_text = "dijo."
    /// "#).unwrap();
    ///
    /// assert_eq!(config.reference.he_said_text, "dijo.");
    /// assert_eq!(config.reference.word_separator, " ");
    /// assert!(config.replay.match_unchunked_blocks);
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ScripturaConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}
