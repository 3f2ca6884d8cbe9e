//! Flat `a.b.c = value` keys to nested trees
//!
//! Used by every source that only knows flat names: properties, environment
//! variables and command-line arguments.

use super::{merge, FieldPath, RawTree, Segment};
use std::collections::BTreeMap;

/// Insert `value` at the dotted `key`, creating intermediate mappings.
///
/// A scalar already sitting where a mapping is needed is replaced, the same
/// outcome a later source would have under [`merge`].
pub fn insert_flat(tree: &mut RawTree, key: &str, value: RawTree) {
    insert_at(tree, &FieldPath::parse(key), value);
}

/// [`insert_flat`] for a path that is already split into segments.
pub fn insert_at(tree: &mut RawTree, path: &FieldPath, value: RawTree) {
    if path.is_root() {
        return;
    }
    let nested = path
        .segments()
        .iter()
        .rev()
        .fold(value, |inner, segment| RawTree::Mapping(BTreeMap::from([(segment.as_key(), inner)])));
    let current = std::mem::take(tree);
    *tree = merge(current, nested);
}

/// Replace the single node at `path`, leaving its siblings alone.
///
/// Existing sequences are entered by index, so `hosts.1.token` lands on the
/// second element instead of replacing the list; an index past the end sets
/// nothing. Existing mapping keys match ignoring ASCII case. A scalar in the
/// way becomes a mapping.
pub fn set_at(tree: &mut RawTree, path: &FieldPath, value: RawTree) {
    set_in(tree, path.segments(), value);
}

fn set_in(node: &mut RawTree, segments: &[Segment], value: RawTree) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if let RawTree::Sequence(items) = node {
        let index = match head {
            Segment::Index(index) => Some(*index),
            Segment::Key(key) => key.parse::<usize>().ok(),
        };
        if let Some(item) = index.and_then(|i| items.get_mut(i)) {
            set_in(item, rest, value);
        }
        return;
    }
    if !matches!(node, RawTree::Mapping(_)) {
        *node = RawTree::empty();
    }
    if let RawTree::Mapping(map) = node {
        let mut key = head.as_key();
        if !map.contains_key(&key) {
            if let Some(folded) = map.keys().find(|k| k.eq_ignore_ascii_case(&key)) {
                key = folded.clone();
            }
        }
        let child = map.entry(key).or_insert_with(RawTree::empty);
        set_in(child, rest, value);
    }
}

/// Build a tree from flat pairs. Keys are applied in sorted order so the
/// result does not depend on the iteration order of the source.
pub fn expand_flat<I, K, V>(pairs: I) -> RawTree
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let sorted: BTreeMap<String, String> =
        pairs.into_iter().map(|(k, v)| (k.as_ref().to_string(), v.into())).collect();
    let mut tree = RawTree::empty();
    for (key, value) in sorted {
        insert_flat(&mut tree, &key, RawTree::string(value));
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_keys_nest() {
        let tree = expand_flat([("db.url", "postgres://x"), ("db.pool.max", "8"), ("name", "svc")]);
        assert_eq!(
            tree,
            RawTree::from(json!({"db": {"url": "postgres://x", "pool": {"max": "8"}}, "name": "svc"}))
        );
    }

    #[test]
    fn indexed_keys_become_numeric_mapping_keys() {
        let tree = expand_flat([("hosts[1]", "b"), ("hosts.0", "a")]);
        assert_eq!(tree, RawTree::from(json!({"hosts": {"0": "a", "1": "b"}})));
    }

    #[test]
    fn deeper_key_replaces_scalar() {
        let tree = expand_flat([("a", "1"), ("a.b", "2")]);
        assert_eq!(tree, RawTree::from(json!({"a": {"b": "2"}})));
    }

    #[test]
    fn set_at_enters_existing_sequences() {
        let mut tree = RawTree::from(json!({"hosts": [{"name": "a"}, {"name": "b"}], "port": 1}));
        set_at(&mut tree, &FieldPath::parse("hosts.1.token"), RawTree::string("t"));
        set_at(&mut tree, &FieldPath::parse("hosts.7.token"), RawTree::string("u"));
        assert_eq!(
            tree,
            RawTree::from(json!({"hosts": [{"name": "a"}, {"name": "b", "token": "t"}], "port": 1}))
        );
    }

    #[test]
    fn set_at_reuses_keys_ignoring_case() {
        let mut tree = RawTree::from(json!({"dataSource": {"url": "x"}}));
        set_at(&mut tree, &FieldPath::parse("datasource.password"), RawTree::string("pw"));
        set_at(&mut tree, &FieldPath::parse("vault.token"), RawTree::string("v"));
        assert_eq!(
            tree,
            RawTree::from(json!({"dataSource": {"url": "x", "password": "pw"}, "vault": {"token": "v"}}))
        );
    }

    #[test]
    fn empty_key_is_ignored() {
        let tree = expand_flat([("", "x")]);
        assert!(tree.is_empty());
    }
}
