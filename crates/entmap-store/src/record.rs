use entmap_types::{EntityNode, MapNode, RawKey};
use serde::{Deserialize, Serialize};

/// A stored record: its key plus the translated property map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: RawKey,
    pub properties: MapNode,
}

impl Record {
    pub fn new(key: RawKey, properties: MapNode) -> Self {
        Self { key, properties }
    }

    pub fn key(&self) -> &RawKey {
        &self.key
    }

    /// Render the record as JSON for diagnostics.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "key": self.key.to_string(),
            "properties": EntityNode::Map(self.properties.clone()).to_json(),
        })
    }
}
