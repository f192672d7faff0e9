use entmap_translate::TranslateConfig;
use serde::{Deserialize, Serialize};

use crate::error::{EntmapError, EntmapResult};

/// Top-level configuration.
///
/// ```toml
/// eager_load_depth = 4
///
/// [translate]
/// default_indexed = true
/// ignore_unknown_properties = false
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntmapConfig {
    pub translate: TranslateConfig,
    /// How many hops of eager references a single load follows.
    pub eager_load_depth: usize,
}

impl Default for EntmapConfig {
    fn default() -> Self {
        Self {
            translate: TranslateConfig::default(),
            eager_load_depth: 8,
        }
    }
}

impl EntmapConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> EntmapResult<Self> {
        toml::from_str(s).map_err(|e| EntmapError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> EntmapResult<String> {
        toml::to_string(self).map_err(|e| EntmapError::Config(e.to_string()))
    }
}
