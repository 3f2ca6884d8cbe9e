//! Precedence merge of parameter trees
//!
//! Mappings merge key by key; every other pairing (scalars, sequences, or
//! mismatched kinds) is replaced wholesale by the later value. A key the
//! later tree does not mention keeps its earlier value.
//!
//! Keys are compared ignoring ASCII case, the same way struct fields bind,
//! so `exitonrun` from the environment overrides `exitOnRun` from a file.
//! The later spelling is kept.

use super::{FieldPath, RawTree};
use std::collections::BTreeMap;

/// Merge `overlay` on top of `base`.
pub fn merge(base: RawTree, overlay: RawTree) -> RawTree {
    match (base, overlay) {
        (RawTree::Mapping(mut base), RawTree::Mapping(overlay)) => {
            for (key, value) in overlay {
                let merged = match take_key(&mut base, &key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            RawTree::Mapping(base)
        }
        (_, overlay) => overlay,
    }
}

/// Remove `key` from `map`, falling back to a key that differs only in ASCII case.
fn take_key(map: &mut BTreeMap<String, RawTree>, key: &str) -> Option<RawTree> {
    if let Some(value) = map.remove(key) {
        return Some(value);
    }
    let folded = map.keys().find(|k| k.eq_ignore_ascii_case(key))?.clone();
    map.remove(&folded)
}

/// Fold trees left to right, lowest precedence first.
pub fn merge_all<I>(trees: I) -> RawTree
where
    I: IntoIterator<Item = RawTree>,
{
    trees.into_iter().fold(RawTree::empty(), merge)
}

/// Which source last supplied each node of a merged tree.
///
/// Only used to name the source in diagnostics; merging never consults it.
#[derive(Debug, Default, Clone)]
pub struct Provenance {
    sources: BTreeMap<FieldPath, String>,
}

impl Provenance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every node of `tree` as supplied by `source`.
    pub fn record(&mut self, tree: &RawTree, source: &str) {
        let mut path = FieldPath::root();
        self.record_node(tree, source, &mut path);
    }

    fn record_node(&mut self, node: &RawTree, source: &str, path: &mut FieldPath) {
        match node {
            RawTree::Mapping(map) => {
                for (key, value) in map {
                    path.push(key.as_str());
                    self.sources.insert(path.clone(), source.to_string());
                    self.record_node(value, source, path);
                    path.pop();
                }
            }
            RawTree::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    path.push(i);
                    self.sources.insert(path.clone(), source.to_string());
                    self.record_node(item, source, path);
                    path.pop();
                }
            }
            RawTree::Scalar(_) => {}
        }
    }

    /// Record the single node at `path` as supplied by `source`.
    pub fn record_path(&mut self, path: &FieldPath, source: &str) {
        self.sources.insert(path.clone(), source.to_string());
    }

    /// The source that supplied `path`, or the nearest ancestor that was recorded.
    pub fn source_of(&self, path: &FieldPath) -> Option<&str> {
        let mut next = Some(path.clone());
        while let Some(current) = next {
            if let Some(source) = self.lookup(&current) {
                return Some(source);
            }
            next = current.parent();
        }
        None
    }

    fn lookup(&self, path: &FieldPath) -> Option<&str> {
        if let Some(source) = self.sources.get(path) {
            return Some(source);
        }
        // Typed paths use indices where flat sources recorded numeric keys.
        self.sources.iter().find(|(recorded, _)| recorded.matches(path)).map(|(_, s)| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> RawTree {
        RawTree::from(value)
    }

    #[test]
    fn later_source_wins_per_key() {
        let merged = merge_all(vec![tree(json!({"a": 1, "b": 2})), tree(json!({"b": 3, "c": 4}))]);
        assert_eq!(merged, tree(json!({"a": 1, "b": 3, "c": 4})));
    }

    #[test]
    fn nested_mappings_merge_structurally() {
        let merged = merge(
            tree(json!({"db": {"url": "postgres://a", "pool": {"min": 1, "max": 4}}})),
            tree(json!({"db": {"pool": {"max": 16}}})),
        );
        assert_eq!(merged, tree(json!({"db": {"url": "postgres://a", "pool": {"min": 1, "max": 16}}})));
    }

    #[test]
    fn sequences_are_replaced_not_concatenated() {
        let merged = merge(tree(json!({"hosts": ["a", "b", "c"]})), tree(json!({"hosts": ["z"]})));
        assert_eq!(merged, tree(json!({"hosts": ["z"]})));
    }

    #[test]
    fn mismatched_kinds_replace_wholesale() {
        let merged = merge(tree(json!({"x": {"y": 1}})), tree(json!({"x": "flat"})));
        assert_eq!(merged, tree(json!({"x": "flat"})));

        let merged = merge(tree(json!({"x": "flat"})), tree(json!({"x": {"y": 1}})));
        assert_eq!(merged, tree(json!({"x": {"y": 1}})));
    }

    #[test]
    fn keys_differing_in_case_are_one_key() {
        let merged = merge(
            tree(json!({"exitOnRun": false, "dataSource": {"url": "a", "port": 1}})),
            tree(json!({"exitonrun": "true", "datasource": {"port": "2"}})),
        );
        assert_eq!(merged, tree(json!({"exitonrun": "true", "datasource": {"url": "a", "port": "2"}})));
    }

    #[test]
    fn empty_tree_changes_nothing() {
        let base = tree(json!({"a": {"b": [1, 2]}, "c": null}));
        assert_eq!(merge(base.clone(), RawTree::empty()), base);
        assert_eq!(merge(RawTree::empty(), base.clone()), base);
    }

    #[test]
    fn provenance_names_last_writer() {
        let defaults = tree(json!({"db": {"url": "a", "port": 5432}}));
        let env = tree(json!({"db": {"port": "6543"}}));
        let mut provenance = Provenance::new();
        provenance.record(&defaults, "Resource (defaults.yaml)");
        provenance.record(&env, "Environment (APP_)");

        assert_eq!(provenance.source_of(&FieldPath::parse("db.port")), Some("Environment (APP_)"));
        assert_eq!(
            provenance.source_of(&FieldPath::parse("db.url")),
            Some("Resource (defaults.yaml)")
        );
        assert_eq!(
            provenance.source_of(&FieldPath::parse("db.port.deeper")),
            Some("Environment (APP_)")
        );
        assert_eq!(provenance.source_of(&FieldPath::parse("other")), None);
    }
}
