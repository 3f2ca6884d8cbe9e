//! Untyped parameter trees
//!
//! Every gatherer produces a [`RawTree`]; trees are merged by precedence and
//! only then bound to the caller's typed parameters.

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;
use std::fmt;

pub mod flat;
pub mod merge;
pub mod path;

pub use flat::{expand_flat, insert_at, insert_flat, set_at};
pub use merge::{merge, merge_all, Provenance};
pub use path::{FieldPath, Segment};

/// Scalar leaf of a [`RawTree`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Render the scalar the way a flat-key source would have written it.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Str(s) => s.clone(),
        }
    }
}

/// Untyped node: a scalar, an ordered sequence, or a string-keyed mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTree {
    Scalar(Scalar),
    Sequence(Vec<RawTree>),
    Mapping(BTreeMap<String, RawTree>),
}

impl Default for RawTree {
    fn default() -> Self {
        RawTree::empty()
    }
}

impl RawTree {
    /// An empty mapping, the identity element for [`merge`].
    pub fn empty() -> Self {
        RawTree::Mapping(BTreeMap::new())
    }

    pub fn null() -> Self {
        RawTree::Scalar(Scalar::Null)
    }

    pub fn string(value: impl Into<String>) -> Self {
        RawTree::Scalar(Scalar::Str(value.into()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawTree::Scalar(Scalar::Null))
    }

    /// True for an empty mapping or sequence.
    pub fn is_empty(&self) -> bool {
        match self {
            RawTree::Mapping(map) => map.is_empty(),
            RawTree::Sequence(items) => items.is_empty(),
            RawTree::Scalar(_) => false,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, RawTree>> {
        match self {
            RawTree::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawTree::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Short description of the node kind, safe to log.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RawTree::Scalar(Scalar::Null) => "null",
            RawTree::Scalar(Scalar::Bool(_)) => "boolean",
            RawTree::Scalar(Scalar::Int(_)) => "integer",
            RawTree::Scalar(Scalar::Float(_)) => "float",
            RawTree::Scalar(Scalar::Str(_)) => "string",
            RawTree::Sequence(_) => "sequence",
            RawTree::Mapping(_) => "mapping",
        }
    }

    /// Number of nodes in the tree, including the root.
    pub fn node_count(&self) -> usize {
        1 + match self {
            RawTree::Scalar(_) => 0,
            RawTree::Sequence(items) => items.iter().map(RawTree::node_count).sum(),
            RawTree::Mapping(map) => map.values().map(RawTree::node_count).sum(),
        }
    }

    fn child(&self, segment: &Segment) -> Option<&RawTree> {
        match (self, segment) {
            (RawTree::Mapping(map), segment) => map.get(&segment.as_key()),
            (RawTree::Sequence(items), Segment::Index(i)) => items.get(*i),
            (RawTree::Sequence(items), Segment::Key(key)) => {
                key.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            (RawTree::Scalar(_), _) => None,
        }
    }

    fn child_mut(&mut self, segment: &Segment) -> Option<&mut RawTree> {
        match (self, segment) {
            (RawTree::Mapping(map), segment) => map.get_mut(&segment.as_key()),
            (RawTree::Sequence(items), Segment::Index(i)) => items.get_mut(*i),
            (RawTree::Sequence(items), Segment::Key(key)) => match key.parse::<usize>() {
                Ok(i) => items.get_mut(i),
                Err(_) => None,
            },
            (RawTree::Scalar(_), _) => None,
        }
    }

    pub fn get(&self, path: &FieldPath) -> Option<&RawTree> {
        path.segments().iter().try_fold(self, |node, segment| node.child(segment))
    }

    pub fn get_mut(&mut self, path: &FieldPath) -> Option<&mut RawTree> {
        path.segments().iter().try_fold(self, |node, segment| node.child_mut(segment))
    }

    /// Detach the node at `path`. The root cannot be removed.
    pub fn remove(&mut self, path: &FieldPath) -> Option<RawTree> {
        let (last, parent) = (path.last()?, path.parent()?);
        match (self.get_mut(&parent)?, last) {
            (RawTree::Mapping(map), segment) => map.remove(&segment.as_key()),
            (RawTree::Sequence(items), segment) => {
                let index = match segment {
                    Segment::Index(i) => *i,
                    Segment::Key(key) => key.parse::<usize>().ok()?,
                };
                (index < items.len()).then(|| items.remove(index))
            }
            (RawTree::Scalar(_), _) => None,
        }
    }

    /// Swap the node at `path` for `value`, returning the previous node.
    pub fn replace(&mut self, path: &FieldPath, value: RawTree) -> Option<RawTree> {
        self.get_mut(path).map(|node| std::mem::replace(node, value))
    }

    /// Every scalar leaf with its path, in key order. Empty containers yield nothing.
    pub fn leaves(&self) -> Vec<(FieldPath, &Scalar)> {
        let mut out = Vec::new();
        collect_leaves(self, &mut FieldPath::root(), &mut out);
        out
    }
}

fn collect_leaves<'a>(node: &'a RawTree, path: &mut FieldPath, out: &mut Vec<(FieldPath, &'a Scalar)>) {
    match node {
        RawTree::Scalar(scalar) => out.push((path.clone(), scalar)),
        RawTree::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(i);
                collect_leaves(item, path, out);
                path.pop();
            }
        }
        RawTree::Mapping(map) => {
            for (key, value) in map {
                path.push(key.as_str());
                collect_leaves(value, path, out);
                path.pop();
            }
        }
    }
}

impl From<Scalar> for RawTree {
    fn from(scalar: Scalar) -> Self {
        RawTree::Scalar(scalar)
    }
}

impl From<&str> for RawTree {
    fn from(value: &str) -> Self {
        RawTree::string(value)
    }
}

impl From<String> for RawTree {
    fn from(value: String) -> Self {
        RawTree::string(value)
    }
}

impl From<bool> for RawTree {
    fn from(value: bool) -> Self {
        RawTree::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for RawTree {
    fn from(value: i64) -> Self {
        RawTree::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for RawTree {
    fn from(value: f64) -> Self {
        RawTree::Scalar(Scalar::Float(value))
    }
}

impl From<serde_json::Value> for RawTree {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => RawTree::null(),
            Value::Bool(b) => b.into(),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => i.into(),
                (None, Some(f)) => f.into(),
                (None, None) => RawTree::string(n.to_string()),
            },
            Value::String(s) => s.into(),
            Value::Array(items) => RawTree::Sequence(items.into_iter().map(RawTree::from).collect()),
            Value::Object(map) => {
                RawTree::Mapping(map.into_iter().map(|(k, v)| (k, RawTree::from(v))).collect())
            }
        }
    }
}

impl Serialize for RawTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawTree::Scalar(Scalar::Null) => serializer.serialize_unit(),
            RawTree::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(*b),
            RawTree::Scalar(Scalar::Int(i)) => serializer.serialize_i64(*i),
            RawTree::Scalar(Scalar::Float(f)) => serializer.serialize_f64(*f),
            RawTree::Scalar(Scalar::Str(s)) => serializer.serialize_str(s),
            RawTree::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            RawTree::Mapping(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for RawTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RawTreeVisitor)
    }
}

struct RawTreeVisitor;

impl<'de> Visitor<'de> for RawTreeVisitor {
    type Value = RawTree;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a configuration value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<RawTree, E> {
        Ok(v.into())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RawTree, E> {
        Ok(v.into())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RawTree, E> {
        // Values beyond i64 keep their magnitude as a float.
        Ok(i64::try_from(v).map(RawTree::from).unwrap_or_else(|_| (v as f64).into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RawTree, E> {
        Ok(v.into())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RawTree, E> {
        Ok(v.into())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<RawTree, E> {
        Ok(v.into())
    }

    fn visit_unit<E: de::Error>(self) -> Result<RawTree, E> {
        Ok(RawTree::null())
    }

    fn visit_none<E: de::Error>(self) -> Result<RawTree, E> {
        Ok(RawTree::null())
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<RawTree, D::Error> {
        RawTree::deserialize(deserializer)
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<RawTree, D::Error> {
        RawTree::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawTree, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(RawTree::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawTree, A::Error> {
        let mut map = BTreeMap::new();
        while let Some(key) = access.next_key::<RawTree>()? {
            let key = match key {
                RawTree::Scalar(scalar) => scalar.to_text(),
                other => {
                    return Err(de::Error::custom(format!(
                        "unsupported {} used as a mapping key",
                        other.kind_name()
                    )))
                }
            };
            map.insert(key, access.next_value()?);
        }
        Ok(RawTree::Mapping(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RawTree {
        RawTree::from(json!({
            "db": {"url": "postgres://db", "replicas": [{"host": "a"}, {"host": "b"}]},
            "port": 8080
        }))
    }

    #[test]
    fn get_follows_keys_and_indices() {
        let tree = sample();
        let host = tree.get(&FieldPath::parse("db.replicas[1].host")).expect("host");
        assert_eq!(host.as_str(), Some("b"));
        assert!(tree.get(&FieldPath::parse("db.missing")).is_none());
        assert!(tree.get(&FieldPath::parse("port.deeper")).is_none());
    }

    #[test]
    fn remove_and_replace() {
        let mut tree = sample();
        let removed = tree.remove(&FieldPath::parse("db.replicas.0")).expect("removed");
        assert_eq!(removed, RawTree::from(json!({"host": "a"})));
        assert_eq!(tree.get(&FieldPath::parse("db.replicas[0].host")).and_then(RawTree::as_str), Some("b"));

        let previous = tree.replace(&FieldPath::parse("port"), RawTree::null());
        assert_eq!(previous, Some(RawTree::from(8080i64)));
        assert!(tree.get(&FieldPath::parse("port")).is_some_and(RawTree::is_null));

        assert!(tree.remove(&FieldPath::root()).is_none());
    }

    #[test]
    fn leaves_are_listed_in_key_order() {
        let tree = sample();
        let paths: Vec<String> = tree.leaves().into_iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(paths, vec!["db.replicas[0].host", "db.replicas[1].host", "db.url", "port"]);
    }

    #[test]
    fn yaml_integer_keys_become_strings() {
        let tree: RawTree = serde_yaml::from_str("ports:\n  80: http\n  443: https\n").expect("yaml");
        assert_eq!(
            tree.get(&FieldPath::parse("ports.443")).and_then(RawTree::as_str),
            Some("https")
        );
    }

    #[test]
    fn node_count_includes_root() {
        assert_eq!(RawTree::empty().node_count(), 1);
        assert_eq!(sample().node_count(), 9);
    }
}
