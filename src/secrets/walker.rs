//! Depth-first walks that find, mask and inject secret fields

use super::{Key, NodeId, TextRef, TextSlot, Visitor, VisitorMut, Walk};
use crate::error::SecretsError;
use crate::tree::{FieldPath, Segment};

/// Replacement for every secret value in externally visible output.
pub const MASK: &str = "*****";

/// A field carrying the secret marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretField {
    /// Full path from the root, using serialized field names.
    pub path: FieldPath,
    /// Type of the nearest enclosing struct.
    pub container: &'static str,
    /// Path of the field relative to `container`.
    pub name: String,
    pub field_type: &'static str,
}

struct Frame {
    segment: Option<Segment>,
    id: Option<NodeId>,
    secret: bool,
    shared: bool,
}

/// The path under construction.
#[derive(Default)]
struct Cursor {
    frames: Vec<Frame>,
    pending_shared: bool,
}

impl Cursor {
    fn path(&self) -> FieldPath {
        self.frames.iter().filter_map(|f| f.segment.clone()).collect::<Vec<_>>().into()
    }

    fn child_path(&self, key: Key<'_>) -> FieldPath {
        let mut path = self.path();
        if let Some(segment) = key.segment() {
            path.push(segment);
        }
        path
    }

    fn inherited_secret(&self) -> bool {
        self.frames.last().is_some_and(|f| f.secret)
    }

    fn inside_shared(&self) -> bool {
        self.pending_shared || self.frames.last().is_some_and(|f| f.shared)
    }

    fn check_cycle(&self, id: NodeId, path: impl FnOnce() -> FieldPath) -> Result<(), SecretsError> {
        if self.frames.iter().any(|f| f.id == Some(id)) {
            return Err(SecretsError::CyclicGraph { path: path(), type_name: id.type_name() });
        }
        Ok(())
    }

    fn enter(&mut self, key: Key<'_>, secret: bool, id: Option<NodeId>) -> Result<(), SecretsError> {
        if let Some(id) = id {
            self.check_cycle(id, || self.child_path(key))?;
        }
        let frame = Frame {
            segment: key.segment(),
            id,
            secret: secret || self.inherited_secret(),
            shared: self.inside_shared(),
        };
        self.pending_shared = false;
        self.frames.push(frame);
        Ok(())
    }

    fn leave(&mut self) {
        self.frames.pop();
    }

    fn guard(&mut self, key: Key<'_>, id: NodeId) -> Result<(), SecretsError> {
        self.check_cycle(id, || self.child_path(key))?;
        self.pending_shared = true;
        Ok(())
    }

    /// Whether a leaf sits below a shared node. Clears a guard that was not
    /// followed by a struct.
    fn settle_leaf(&mut self) -> bool {
        let shared = self.inside_shared();
        self.pending_shared = false;
        shared
    }

    /// Leaves take the marker of their own field or any ancestor.
    fn leaf_is_secret(&self, secret: bool) -> bool {
        secret || self.inherited_secret()
    }

    /// Nearest enclosing struct and the leaf's path below it.
    fn container_of(&self, key: Key<'_>) -> (&'static str, String) {
        let start = self.frames.iter().rposition(|f| f.id.is_some());
        let container = start
            .and_then(|i| self.frames[i].id)
            .map_or("<root>", |id| id.type_name());
        let from = start.map_or(0, |i| i + 1);
        let mut segments: Vec<Segment> = self.frames[from..].iter().filter_map(|f| f.segment.clone()).collect();
        segments.extend(key.segment());
        (container, FieldPath::new(segments).to_string())
    }
}

struct FindSecrets {
    cursor: Cursor,
    found: Vec<SecretField>,
}

impl Visitor for FindSecrets {
    fn enter(&mut self, key: Key<'_>, secret: bool, id: Option<NodeId>) -> Result<bool, SecretsError> {
        self.cursor.enter(key, secret, id)?;
        Ok(true)
    }

    fn leave(&mut self) {
        self.cursor.leave();
    }

    fn text(&mut self, key: Key<'_>, secret: bool, value: TextRef<'_>) -> Result<(), SecretsError> {
        if !self.cursor.leaf_is_secret(secret) {
            return Ok(());
        }
        let (container, name) = self.cursor.container_of(key);
        let path = self.cursor.child_path(key);
        let field_type = match value {
            TextRef::Required(_) => "String",
            TextRef::Optional(_) => "Option<String>",
        };
        self.found.push(SecretField { path, container, name, field_type });
        Ok(())
    }

    fn guard(&mut self, key: Key<'_>, id: NodeId) -> Result<(), SecretsError> {
        self.cursor.guard(key, id)
    }
}

/// List every field carrying the secret marker, present or not.
pub fn find_secret_fields<T: Walk + ?Sized>(root: &T) -> Result<Vec<SecretField>, SecretsError> {
    let mut visitor = FindSecrets { cursor: Cursor::default(), found: Vec::new() };
    root.walk(Key::Root, false, &mut visitor)?;
    Ok(visitor.found)
}

struct Masker {
    cursor: Cursor,
    /// Refuse to write through shared nodes the caller still holds.
    copy: bool,
}

impl VisitorMut for Masker {
    fn enter(&mut self, key: Key<'_>, secret: bool, id: Option<NodeId>) -> Result<bool, SecretsError> {
        self.cursor.enter(key, secret, id)?;
        Ok(true)
    }

    fn leave(&mut self) {
        self.cursor.leave();
    }

    fn text(&mut self, key: Key<'_>, secret: bool, slot: TextSlot<'_>) -> Result<(), SecretsError> {
        let shared = self.cursor.settle_leaf();
        if !self.cursor.leaf_is_secret(secret) {
            return Ok(());
        }
        if self.copy && shared {
            return Err(SecretsError::SharedSecret { path: self.cursor.child_path(key) });
        }
        match slot {
            TextSlot::Required(value) => *value = MASK.to_string(),
            TextSlot::Optional(Some(value)) => *value = MASK.to_string(),
            TextSlot::Optional(None) => {}
        }
        Ok(())
    }

    fn guard(&mut self, key: Key<'_>, id: NodeId) -> Result<(), SecretsError> {
        self.cursor.guard(key, id)
    }
}

/// Replace every present secret value with [`MASK`]. Absent values stay absent.
pub fn mask_in_place<T: Walk + ?Sized>(root: &mut T) -> Result<(), SecretsError> {
    let mut visitor = Masker { cursor: Cursor::default(), copy: false };
    root.walk_mut(Key::Root, false, &mut visitor)
}

/// A clone of `root` with every secret masked; `root` itself is untouched.
///
/// Relies on `Clone` being deep. Secrets below an `Rc<RefCell<_>>` would be
/// masked in the original as well, so they are rejected.
pub fn masked_copy<T: Walk + Clone>(root: &T) -> Result<T, SecretsError> {
    find_secret_fields(root)?;
    let mut copy = root.clone();
    let mut visitor = Masker { cursor: Cursor::default(), copy: true };
    copy.walk_mut(Key::Root, false, &mut visitor)?;
    Ok(copy)
}

struct Injector<'a> {
    cursor: Cursor,
    target: &'a FieldPath,
    value: Option<String>,
}

impl VisitorMut for Injector<'_> {
    fn enter(&mut self, key: Key<'_>, secret: bool, id: Option<NodeId>) -> Result<bool, SecretsError> {
        if !self.cursor.child_path(key).is_prefix_of(self.target) {
            return Ok(false);
        }
        self.cursor.enter(key, secret, id)?;
        Ok(true)
    }

    fn leave(&mut self) {
        self.cursor.leave();
    }

    fn text(&mut self, key: Key<'_>, secret: bool, slot: TextSlot<'_>) -> Result<(), SecretsError> {
        if !self.cursor.leaf_is_secret(secret) || !self.cursor.child_path(key).matches(self.target) {
            return Ok(());
        }
        let Some(value) = self.value.take() else {
            return Ok(());
        };
        match slot {
            TextSlot::Required(current) => *current = value,
            TextSlot::Optional(current) => *current = Some(value),
        }
        Ok(())
    }

    fn guard(&mut self, key: Key<'_>, id: NodeId) -> Result<(), SecretsError> {
        self.cursor.guard(key, id)
    }
}

/// Set the secret field at `path` to `value`, touching nothing else.
///
/// Fails with [`SecretsError::PathNotFound`] unless `path` resolves to a
/// present field carrying the secret marker.
pub fn inject_secret<T: Walk + ?Sized>(
    root: &mut T,
    path: &FieldPath,
    value: impl Into<String>,
) -> Result<(), SecretsError> {
    let mut visitor = Injector { cursor: Cursor::default(), target: path, value: Some(value.into()) };
    root.walk_mut(Key::Root, false, &mut visitor)?;
    if visitor.value.is_some() {
        return Err(SecretsError::PathNotFound { path: path.clone() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_walk;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Credentials {
        user: String,
        password: String,
    }

    impl_walk!(Credentials { secret: [password] });

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Params {
        name: String,
        db: Credentials,
        replicas: Vec<Credentials>,
        api_key: Option<String>,
        vault: BTreeMap<String, String>,
        fallback: Option<Credentials>,
    }

    impl_walk!(Params {
        nested: [db, replicas, fallback],
        secret: [api_key = "apiKey", vault],
    });

    fn sample() -> Params {
        Params {
            name: "svc".into(),
            db: Credentials { user: "alice".into(), password: "hunter2".into() },
            replicas: vec![
                Credentials { user: "r0".into(), password: "p0".into() },
                Credentials { user: "r1".into(), password: String::new() },
            ],
            api_key: None,
            vault: BTreeMap::from([("token".to_string(), "t0k3n".to_string())]),
            fallback: None,
        }
    }

    fn paths(fields: &[SecretField]) -> Vec<String> {
        fields.iter().map(|f| f.path.to_string()).collect()
    }

    #[test]
    fn finds_marked_fields_regardless_of_value() {
        let fields = find_secret_fields(&sample()).expect("walk");
        assert_eq!(
            paths(&fields),
            vec!["db.password", "replicas[0].password", "replicas[1].password", "apiKey", "vault.token"]
        );

        let api_key = &fields[3];
        assert_eq!(api_key.field_type, "Option<String>");
        assert!(api_key.container.ends_with("Params"));
        assert_eq!(api_key.name, "apiKey");

        let replica = &fields[2];
        assert!(replica.container.ends_with("Credentials"));
        assert_eq!(replica.name, "password");
        assert_eq!(fields[4].name, "vault.token");
    }

    #[test]
    fn masking_replaces_present_values_only() {
        let mut params = sample();
        mask_in_place(&mut params).expect("mask");
        assert_eq!(params.db.password, MASK);
        assert_eq!(params.replicas[1].password, MASK);
        assert_eq!(params.api_key, None);
        assert_eq!(params.vault["token"], MASK);
        assert_eq!(params.db.user, "alice");
        assert_eq!(params.name, "svc");

        let once = params.clone();
        mask_in_place(&mut params).expect("mask again");
        assert_eq!(params, once);
    }

    #[test]
    fn masked_copy_leaves_original_alone() {
        let original = sample();
        let copy = masked_copy(&original).expect("copy");
        assert_eq!(original, sample());
        assert_eq!(copy.replicas[0].password, MASK);
    }

    #[test]
    fn inject_sets_exactly_one_field() {
        let mut params = sample();
        inject_secret(&mut params, &FieldPath::parse("replicas.1.password"), "s3cret").expect("inject");
        inject_secret(&mut params, &FieldPath::parse("apiKey"), "k").expect("inject optional");

        let mut expected = sample();
        expected.replicas[1].password = "s3cret".into();
        expected.api_key = Some("k".into());
        assert_eq!(params, expected);
    }

    #[test]
    fn inject_refuses_unmarked_or_missing_paths() {
        let mut params = sample();
        for path in ["name", "db.user", "db.nope", "replicas[5].password", "fallback.password", "vault.other"] {
            let err = inject_secret(&mut params, &FieldPath::parse(path), "x").unwrap_err();
            assert_eq!(err, SecretsError::PathNotFound { path: FieldPath::parse(path) });
        }
        assert_eq!(params, sample());
    }

    #[derive(Debug, Clone, Default)]
    struct Node {
        token: String,
        next: Option<Rc<RefCell<Node>>>,
    }

    impl_walk!(Node { nested: [next], secret: [token] });

    #[test]
    fn self_reference_is_reported_as_cycle() {
        let node = Rc::new(RefCell::new(Node { token: "t".into(), next: None }));
        node.borrow_mut().next = Some(Rc::clone(&node));

        let err = find_secret_fields(&node).unwrap_err();
        assert!(matches!(&err, SecretsError::CyclicGraph { type_name, .. } if type_name.ends_with("Node")));
        assert_eq!(err, SecretsError::CyclicGraph { path: FieldPath::parse("next"), type_name: std::any::type_name::<Node>() });

        let mut root = Rc::clone(&node);
        assert!(matches!(mask_in_place(&mut root), Err(SecretsError::CyclicGraph { .. })));

        node.borrow_mut().next = None;
    }

    #[derive(Debug, Clone)]
    struct Pair {
        left: Rc<RefCell<Credentials>>,
        right: Rc<RefCell<Credentials>>,
    }

    impl_walk!(Pair { nested: [left, right] });

    #[test]
    fn shared_nodes_are_walked_but_not_masked_through_a_copy() {
        let shared = Rc::new(RefCell::new(Credentials { user: "u".into(), password: "p".into() }));
        let mut pair = Pair { left: Rc::clone(&shared), right: Rc::clone(&shared) };

        assert_eq!(paths(&find_secret_fields(&pair).expect("walk")), vec!["left.password", "right.password"]);
        let err = masked_copy(&pair).unwrap_err();
        assert_eq!(err, SecretsError::SharedSecret { path: FieldPath::parse("left.password") });
        assert_eq!(shared.borrow().password, "p");

        mask_in_place(&mut pair).expect("mask");
        assert_eq!(shared.borrow().password, MASK);
    }

    #[test]
    fn outstanding_borrow_is_an_error() {
        let shared = Rc::new(RefCell::new(Credentials::default()));
        let pair = Pair { left: Rc::clone(&shared), right: Rc::clone(&shared) };
        let _held = shared.borrow_mut();
        assert!(matches!(find_secret_fields(&pair), Err(SecretsError::Borrowed { .. })));
    }
}
