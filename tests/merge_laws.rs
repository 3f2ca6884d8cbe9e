//! Property tests for layered merging

use layered_params::tree::{merge, merge_all};
use layered_params::{FieldPath, RawTree};
use proptest::prelude::*;

fn scalar() -> impl Strategy<Value = RawTree> {
    prop_oneof![
        Just(RawTree::null()),
        any::<bool>().prop_map(RawTree::from),
        (-1000i64..1000).prop_map(RawTree::from),
        "[a-z]{0,6}".prop_map(RawTree::from),
    ]
}

fn tree() -> impl Strategy<Value = RawTree> {
    scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(RawTree::Sequence),
            prop::collection::btree_map("[a-c]", inner, 0..4).prop_map(RawTree::Mapping),
        ]
    })
}

fn layer() -> impl Strategy<Value = RawTree> {
    prop::collection::btree_map("[a-c]", tree(), 0..4).prop_map(RawTree::Mapping)
}

fn prefix(path: &FieldPath, len: usize) -> FieldPath {
    FieldPath::new(path.segments()[..len].to_vec())
}

/// Whether `overlay` replaces whatever `base` holds at `path`.
fn shadowed(base: &RawTree, overlay: &RawTree, path: &FieldPath) -> bool {
    for len in 0..=path.len() {
        let at = prefix(path, len);
        let Some(top) = overlay.get(&at) else {
            return false;
        };
        if len == path.len() {
            return true;
        }
        let both_mappings = top.as_mapping().is_some() && base.get(&at).and_then(RawTree::as_mapping).is_some();
        if !both_mappings {
            return true;
        }
    }
    false
}

proptest! {
    #[test]
    fn prop_later_layer_wins(base in layer(), overlay in layer()) {
        let merged = merge(base, overlay.clone());
        for (path, value) in overlay.leaves() {
            prop_assert_eq!(merged.get(&path), Some(&RawTree::Scalar(value.clone())), "at {}", path);
        }
    }

    #[test]
    fn prop_absence_never_overrides(base in layer(), overlay in layer()) {
        let merged = merge(base.clone(), overlay.clone());
        for (path, value) in base.leaves() {
            if !shadowed(&base, &overlay, &path) {
                prop_assert_eq!(merged.get(&path), Some(&RawTree::Scalar(value.clone())), "at {}", path);
            }
        }
    }

    #[test]
    fn prop_empty_layer_is_identity(base in layer()) {
        prop_assert_eq!(merge(base.clone(), RawTree::empty()), base.clone());
        prop_assert_eq!(merge(RawTree::empty(), base.clone()), base);
    }

    #[test]
    fn prop_merge_is_idempotent(base in layer()) {
        prop_assert_eq!(merge(base.clone(), base.clone()), base);
    }

    #[test]
    fn prop_sources_fold_in_order(a in layer(), b in layer(), c in layer()) {
        let all = merge_all([a.clone(), b.clone(), c.clone()]);
        prop_assert_eq!(all, merge(merge_all([a, b]), c));
    }

    #[test]
    fn prop_empty_source_changes_nothing(a in layer(), c in layer()) {
        let with_empty = merge_all([a.clone(), RawTree::empty(), c.clone()]);
        prop_assert_eq!(with_empty, merge_all([a, c]));
    }

    #[test]
    fn prop_merge_all_folds_left(layers in prop::collection::vec(layer(), 0..5)) {
        let folded = layers.iter().cloned().fold(RawTree::empty(), merge);
        prop_assert_eq!(merge_all(layers), folded);
    }
}
