//! Declared secret fields and the walks over them
//!
//! A parameter type opts in by implementing [`Walk`], normally through
//! [`impl_walk!`](crate::impl_walk), which lists the fields to descend into
//! and the fields that hold secrets. Nothing is discovered at runtime: the
//! declaration is the marker.
//!
//! ```
//! use layered_params::impl_walk;
//!
//! #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! struct Database {
//!     url: String,
//!     password: String,
//! }
//!
//! impl_walk!(Database { secret: [password] });
//!
//! let db = Database { url: "postgres://db".into(), password: "hunter2".into() };
//! let fields = layered_params::find_secret_fields(&db).unwrap();
//! assert_eq!(fields[0].path.to_string(), "password");
//! ```

mod serializer;
mod walker;

pub use serializer::SecretsSerializer;
pub use walker::{find_secret_fields, inject_secret, mask_in_place, masked_copy, SecretField, MASK};

use crate::error::SecretsError;
use crate::tree::Segment;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::rc::Rc;

/// How a node is reached from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'a> {
    Root,
    Name(&'a str),
    Index(usize),
}

impl Key<'_> {
    pub fn segment(&self) -> Option<Segment> {
        match self {
            Key::Root => None,
            Key::Name(name) => Some(Segment::Key((*name).to_string())),
            Key::Index(index) => Some(Segment::Index(*index)),
        }
    }
}

/// Identity of a struct node in memory, used to spot cycles.
///
/// The type name is part of the identity because a struct and its first field
/// can share an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    addr: usize,
    type_name: &'static str,
}

impl NodeId {
    pub fn of<T>(value: &T) -> Self {
        Self::from_ptr(value as *const T)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self { addr: ptr as usize, type_name: std::any::type_name::<T>() }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// A string leaf as seen by a read-only walk.
#[derive(Debug, Clone, Copy)]
pub enum TextRef<'a> {
    Required(&'a str),
    Optional(Option<&'a str>),
}

/// A string leaf as seen by a mutating walk.
#[derive(Debug)]
pub enum TextSlot<'a> {
    Required(&'a mut String),
    Optional(&'a mut Option<String>),
}

/// Receives a read-only walk.
///
/// `enter` returning `false` skips the node: no children and no `leave`.
pub trait Visitor {
    fn enter(&mut self, key: Key<'_>, secret: bool, id: Option<NodeId>) -> Result<bool, SecretsError>;
    fn leave(&mut self);
    fn text(&mut self, key: Key<'_>, secret: bool, value: TextRef<'_>) -> Result<(), SecretsError>;
    /// Called before the shared node reached through `key` is borrowed.
    fn guard(&mut self, key: Key<'_>, id: NodeId) -> Result<(), SecretsError>;
}

/// Receives a mutating walk. Same contract as [`Visitor`].
pub trait VisitorMut {
    fn enter(&mut self, key: Key<'_>, secret: bool, id: Option<NodeId>) -> Result<bool, SecretsError>;
    fn leave(&mut self);
    fn text(&mut self, key: Key<'_>, secret: bool, slot: TextSlot<'_>) -> Result<(), SecretsError>;
    fn guard(&mut self, key: Key<'_>, id: NodeId) -> Result<(), SecretsError>;
}

/// A parameter node whose fields can be enumerated, read and written.
///
/// `secret` is the marker on the field that holds this node; it applies to
/// every string leaf below it.
pub trait Walk {
    fn walk(&self, key: Key<'_>, secret: bool, visitor: &mut dyn Visitor) -> Result<(), SecretsError>;

    fn walk_mut(&mut self, key: Key<'_>, secret: bool, visitor: &mut dyn VisitorMut) -> Result<(), SecretsError>;

    #[doc(hidden)]
    fn walk_option(
        slot: &Option<Self>,
        key: Key<'_>,
        secret: bool,
        visitor: &mut dyn Visitor,
    ) -> Result<(), SecretsError>
    where
        Self: Sized,
    {
        match slot {
            Some(value) => value.walk(key, secret, visitor),
            None => Ok(()),
        }
    }

    #[doc(hidden)]
    fn walk_option_mut(
        slot: &mut Option<Self>,
        key: Key<'_>,
        secret: bool,
        visitor: &mut dyn VisitorMut,
    ) -> Result<(), SecretsError>
    where
        Self: Sized,
    {
        match slot {
            Some(value) => value.walk_mut(key, secret, visitor),
            None => Ok(()),
        }
    }
}

impl Walk for String {
    fn walk(&self, key: Key<'_>, secret: bool, visitor: &mut dyn Visitor) -> Result<(), SecretsError> {
        visitor.text(key, secret, TextRef::Required(self))
    }

    fn walk_mut(&mut self, key: Key<'_>, secret: bool, visitor: &mut dyn VisitorMut) -> Result<(), SecretsError> {
        visitor.text(key, secret, TextSlot::Required(self))
    }

    // An absent secret string is still a secret field.
    fn walk_option(
        slot: &Option<Self>,
        key: Key<'_>,
        secret: bool,
        visitor: &mut dyn Visitor,
    ) -> Result<(), SecretsError> {
        visitor.text(key, secret, TextRef::Optional(slot.as_deref()))
    }

    fn walk_option_mut(
        slot: &mut Option<Self>,
        key: Key<'_>,
        secret: bool,
        visitor: &mut dyn VisitorMut,
    ) -> Result<(), SecretsError> {
        visitor.text(key, secret, TextSlot::Optional(slot))
    }
}

impl<T: Walk> Walk for Option<T> {
    fn walk(&self, key: Key<'_>, secret: bool, visitor: &mut dyn Visitor) -> Result<(), SecretsError> {
        T::walk_option(self, key, secret, visitor)
    }

    fn walk_mut(&mut self, key: Key<'_>, secret: bool, visitor: &mut dyn VisitorMut) -> Result<(), SecretsError> {
        T::walk_option_mut(self, key, secret, visitor)
    }
}

impl<T: Walk + ?Sized> Walk for Box<T> {
    fn walk(&self, key: Key<'_>, secret: bool, visitor: &mut dyn Visitor) -> Result<(), SecretsError> {
        (**self).walk(key, secret, visitor)
    }

    fn walk_mut(&mut self, key: Key<'_>, secret: bool, visitor: &mut dyn VisitorMut) -> Result<(), SecretsError> {
        (**self).walk_mut(key, secret, visitor)
    }
}

impl<T: Walk> Walk for Vec<T> {
    fn walk(&self, key: Key<'_>, secret: bool, visitor: &mut dyn Visitor) -> Result<(), SecretsError> {
        if !visitor.enter(key, secret, None)? {
            return Ok(());
        }
        for (i, item) in self.iter().enumerate() {
            item.walk(Key::Index(i), false, visitor)?;
        }
        visitor.leave();
        Ok(())
    }

    fn walk_mut(&mut self, key: Key<'_>, secret: bool, visitor: &mut dyn VisitorMut) -> Result<(), SecretsError> {
        if !visitor.enter(key, secret, None)? {
            return Ok(());
        }
        for (i, item) in self.iter_mut().enumerate() {
            item.walk_mut(Key::Index(i), false, visitor)?;
        }
        visitor.leave();
        Ok(())
    }
}

impl<T: Walk> Walk for BTreeMap<String, T> {
    fn walk(&self, key: Key<'_>, secret: bool, visitor: &mut dyn Visitor) -> Result<(), SecretsError> {
        if !visitor.enter(key, secret, None)? {
            return Ok(());
        }
        for (name, item) in self {
            item.walk(Key::Name(name), false, visitor)?;
        }
        visitor.leave();
        Ok(())
    }

    fn walk_mut(&mut self, key: Key<'_>, secret: bool, visitor: &mut dyn VisitorMut) -> Result<(), SecretsError> {
        if !visitor.enter(key, secret, None)? {
            return Ok(());
        }
        for (name, item) in self.iter_mut() {
            item.walk_mut(Key::Name(name), false, visitor)?;
        }
        visitor.leave();
        Ok(())
    }
}

// Entries are visited in key order so results do not depend on the hasher.
impl<T: Walk, S: BuildHasher> Walk for HashMap<String, T, S> {
    fn walk(&self, key: Key<'_>, secret: bool, visitor: &mut dyn Visitor) -> Result<(), SecretsError> {
        if !visitor.enter(key, secret, None)? {
            return Ok(());
        }
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (name, item) in entries {
            item.walk(Key::Name(name), false, visitor)?;
        }
        visitor.leave();
        Ok(())
    }

    fn walk_mut(&mut self, key: Key<'_>, secret: bool, visitor: &mut dyn VisitorMut) -> Result<(), SecretsError> {
        if !visitor.enter(key, secret, None)? {
            return Ok(());
        }
        let mut entries: Vec<_> = self.iter_mut().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (name, item) in entries {
            item.walk_mut(Key::Name(name), false, visitor)?;
        }
        visitor.leave();
        Ok(())
    }
}

/// Shared nodes are the only way to build a cycle, so they are checked
/// against the current path before being borrowed.
impl<T: Walk> Walk for Rc<RefCell<T>> {
    fn walk(&self, key: Key<'_>, secret: bool, visitor: &mut dyn Visitor) -> Result<(), SecretsError> {
        visitor.guard(key, NodeId::from_ptr(self.as_ptr().cast_const()))?;
        let inner = self
            .try_borrow()
            .map_err(|_| SecretsError::Borrowed { type_name: std::any::type_name::<T>() })?;
        inner.walk(key, secret, visitor)
    }

    fn walk_mut(&mut self, key: Key<'_>, secret: bool, visitor: &mut dyn VisitorMut) -> Result<(), SecretsError> {
        visitor.guard(key, NodeId::from_ptr(self.as_ptr().cast_const()))?;
        let mut inner = self
            .try_borrow_mut()
            .map_err(|_| SecretsError::Borrowed { type_name: std::any::type_name::<T>() })?;
        inner.walk_mut(key, secret, visitor)
    }
}

/// Declare which fields of a parameter struct are walked and which are secret.
///
/// ```text
/// impl_walk!(Params {
///     nested: [database, replicas, auth = "authentication"],
///     secret: [api_key = "apiKey", tokens],
/// });
/// ```
///
/// `nested` fields are descended into; `secret` fields are secret along with
/// everything below them. `field = "name"` gives the serialized name when the
/// field is renamed for serde, so paths line up with the source trees.
#[macro_export]
macro_rules! impl_walk {
    ($ty:ty {
        $(nested: [$($nested:ident $(= $nested_name:literal)?),* $(,)?])? $(,)?
        $(secret: [$($secret:ident $(= $secret_name:literal)?),* $(,)?])? $(,)?
    }) => {
        impl $crate::secrets::Walk for $ty {
            fn walk(
                &self,
                key: $crate::secrets::Key<'_>,
                secret: bool,
                visitor: &mut dyn $crate::secrets::Visitor,
            ) -> ::std::result::Result<(), $crate::error::SecretsError> {
                if !visitor.enter(key, secret, Some($crate::secrets::NodeId::of(self)))? {
                    return Ok(());
                }
                $($(
                    $crate::secrets::Walk::walk(
                        &self.$nested,
                        $crate::secrets::Key::Name($crate::__walk_name!($nested $(= $nested_name)?)),
                        false,
                        visitor,
                    )?;
                )*)?
                $($(
                    $crate::secrets::Walk::walk(
                        &self.$secret,
                        $crate::secrets::Key::Name($crate::__walk_name!($secret $(= $secret_name)?)),
                        true,
                        visitor,
                    )?;
                )*)?
                visitor.leave();
                Ok(())
            }

            fn walk_mut(
                &mut self,
                key: $crate::secrets::Key<'_>,
                secret: bool,
                visitor: &mut dyn $crate::secrets::VisitorMut,
            ) -> ::std::result::Result<(), $crate::error::SecretsError> {
                if !visitor.enter(key, secret, Some($crate::secrets::NodeId::of(&*self)))? {
                    return Ok(());
                }
                $($(
                    $crate::secrets::Walk::walk_mut(
                        &mut self.$nested,
                        $crate::secrets::Key::Name($crate::__walk_name!($nested $(= $nested_name)?)),
                        false,
                        visitor,
                    )?;
                )*)?
                $($(
                    $crate::secrets::Walk::walk_mut(
                        &mut self.$secret,
                        $crate::secrets::Key::Name($crate::__walk_name!($secret $(= $secret_name)?)),
                        true,
                        visitor,
                    )?;
                )*)?
                visitor.leave();
                Ok(())
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __walk_name {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident = $name:literal) => {
        $name
    };
}
