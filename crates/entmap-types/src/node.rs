//! The entity node tree.
//!
//! A schemaless, hierarchical document shape that every typed object is
//! translated into before it reaches the store. It mirrors the store's record
//! shape: leaves carry scalars plus an indexing flag, lists are ordered, and
//! maps keep their children in insertion order so that a save followed by a
//! load sees fields in the order they were written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::TypeError;
use crate::key::RawKey;

/// Opaque scalar carried by a leaf node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Key(RawKey),
}

impl Scalar {
    /// Short name of the scalar variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Key(_) => "key",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => json!(b),
            Self::Integer(i) => json!(i),
            Self::Float(f) => json!(f),
            Self::Text(s) => json!(s),
            Self::Bytes(b) => json!(b),
            Self::Timestamp(t) => json!(t.to_rfc3339()),
            Self::Key(k) => json!(k.to_string()),
        }
    }
}

/// A scalar value with its indexing flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Leaf {
    pub value: Scalar,
    pub indexed: bool,
}

/// Ordered sequence of nodes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListNode {
    items: Vec<EntityNode>,
}

impl ListNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, node: EntityNode) {
        self.items.push(node);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&EntityNode> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntityNode> {
        self.items.iter()
    }
}

impl FromIterator<EntityNode> for ListNode {
    fn from_iter<I: IntoIterator<Item = EntityNode>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ListNode {
    type Item = &'a EntityNode;
    type IntoIter = std::slice::Iter<'a, EntityNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Named child nodes in insertion order.
///
/// Lookups are linear; property maps are small and order matters more than
/// lookup speed here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MapNode {
    entries: Vec<(String, EntityNode)>,
}

impl MapNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a child. An existing child with the same name is replaced in
    /// place and returned.
    pub fn insert(&mut self, name: impl Into<String>, node: EntityNode) -> Option<EntityNode> {
        let name = name.into();
        if let Some((_, existing)) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            return Some(std::mem::replace(existing, node));
        }
        self.entries.push((name, node));
        None
    }

    pub fn get(&self, name: &str) -> Option<&EntityNode> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<EntityNode> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityNode)> {
        self.entries.iter().map(|(n, node)| (n.as_str(), node))
    }
}

/// One node of the entity node tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntityNode {
    Leaf(Leaf),
    List(ListNode),
    Map(MapNode),
}

impl EntityNode {
    pub fn leaf(value: Scalar, indexed: bool) -> Self {
        Self::Leaf(Leaf { value, indexed })
    }

    pub fn null(indexed: bool) -> Self {
        Self::leaf(Scalar::Null, indexed)
    }

    /// Short name of the node variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Leaf(_) => "leaf",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn as_leaf(&self) -> Result<&Leaf, TypeError> {
        match self {
            Self::Leaf(leaf) => Ok(leaf),
            other => Err(TypeError::UnexpectedNode {
                expected: "leaf",
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_list(&self) -> Result<&ListNode, TypeError> {
        match self {
            Self::List(list) => Ok(list),
            other => Err(TypeError::UnexpectedNode {
                expected: "list",
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_map(&self) -> Result<&MapNode, TypeError> {
        match self {
            Self::Map(map) => Ok(map),
            other => Err(TypeError::UnexpectedNode {
                expected: "map",
                found: other.kind_name(),
            }),
        }
    }

    /// Returns `true` for a leaf holding [`Scalar::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Leaf(Leaf { value: Scalar::Null, .. }))
    }

    /// Render the tree as JSON for diagnostics. Index flags are dropped.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Leaf(leaf) => leaf.value.to_json(),
            Self::List(list) => Value::Array(list.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(name, node)| (name.to_string(), node.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<MapNode> for EntityNode {
    fn from(map: MapNode) -> Self {
        Self::Map(map)
    }
}

impl From<ListNode> for EntityNode {
    fn from(list: ListNode) -> Self {
        Self::List(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> EntityNode {
        EntityNode::leaf(Scalar::Text(s.into()), false)
    }

    // -----------------------------------------------------------------------
    // MapNode ordering
    // -----------------------------------------------------------------------

    #[test]
    fn map_preserves_insertion_order() {
        let mut map = MapNode::new();
        map.insert("zeta", text("z"));
        map.insert("alpha", text("a"));
        map.insert("mid", text("m"));
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn map_replace_keeps_position() {
        let mut map = MapNode::new();
        map.insert("a", text("1"));
        map.insert("b", text("2"));
        let old = map.insert("a", text("3"));
        assert_eq!(old, Some(text("1")));
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&text("3")));
    }

    #[test]
    fn map_remove() {
        let mut map = MapNode::new();
        map.insert("a", text("1"));
        assert!(map.remove("a").is_some());
        assert!(map.remove("a").is_none());
        assert!(map.is_empty());
    }

    // -----------------------------------------------------------------------
    // Node accessors
    // -----------------------------------------------------------------------

    #[test]
    fn accessor_mismatch_reports_kinds() {
        let node = text("x");
        let err = node.as_map().unwrap_err();
        assert_eq!(
            err,
            TypeError::UnexpectedNode {
                expected: "map",
                found: "leaf"
            }
        );
        assert!(node.as_leaf().is_ok());
    }

    #[test]
    fn null_detection() {
        assert!(EntityNode::null(true).is_null());
        assert!(!text("x").is_null());
    }

    #[test]
    fn json_rendering() {
        let mut map = MapNode::new();
        map.insert("name", text("ada"));
        map.insert(
            "scores",
            EntityNode::List(
                [1, 2]
                    .into_iter()
                    .map(|i| EntityNode::leaf(Scalar::Integer(i), true))
                    .collect(),
            ),
        );
        let json = EntityNode::Map(map).to_json();
        assert_eq!(json, serde_json::json!({"name": "ada", "scores": [1, 2]}));
    }
}
