use serde::{Deserialize, Serialize};

/// Configuration for the translation engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    /// Index flag used when neither the field nor the class says otherwise.
    pub default_indexed: bool,
    /// When `true`, stored properties that no field accepts are skipped on
    /// load. When `false`, they fail the load.
    pub ignore_unknown_properties: bool,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            default_indexed: false,
            ignore_unknown_properties: true,
        }
    }
}

impl TranslateConfig {
    /// A configuration that rejects stored properties with no matching field.
    pub fn strict() -> Self {
        Self {
            ignore_unknown_properties: false,
            ..Default::default()
        }
    }
}
