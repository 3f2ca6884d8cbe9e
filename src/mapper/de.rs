//! Path-tracking `serde` deserializer over a [`RawTree`]
//!
//! Every problem comes back as a [`BindError`] carrying the path and value
//! that caused it, so the binder can hand it to the error policy.

use crate::error::BindError;
use crate::handler::Problem;
use crate::tree::{FieldPath, RawTree, Scalar, Segment};
use serde::de::value::BorrowedStrDeserializer;
use serde::de::{self, DeserializeSeed, Deserializer, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;
use std::collections::BTreeMap;
use std::collections::HashSet;

pub(crate) struct TreeDeserializer<'de> {
    node: &'de RawTree,
    path: FieldPath,
}

impl<'de> TreeDeserializer<'de> {
    pub(crate) fn new(node: &'de RawTree) -> Self {
        Self { node, path: FieldPath::root() }
    }

    fn at(node: &'de RawTree, path: FieldPath) -> Self {
        Self { node, path }
    }

    fn fail(&self, problem: Problem, message: impl Into<String>) -> BindError {
        BindError::at(problem, &self.path, self.node, message)
    }

    /// Give visitor errors this node's location.
    fn relay<T>(&self, result: Result<T, BindError>) -> Result<T, BindError> {
        result.map_err(|e| e.locate(&self.path, self.node))
    }

    fn deserialize_integer<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let RawTree::Scalar(Scalar::Str(text)) = self.node else {
            return self.deserialize_any(visitor);
        };
        let text = text.trim();
        let result = if let Ok(v) = text.parse::<i64>() {
            visitor.visit_i64(v)
        } else if let Ok(v) = text.parse::<u64>() {
            visitor.visit_u64(v)
        } else {
            return Err(self.fail(Problem::MalformedNumber, format!("`{text}` is not an integer")));
        };
        self.relay(result)
    }

    fn deserialize_float<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let RawTree::Scalar(Scalar::Str(text)) = self.node else {
            return self.deserialize_any(visitor);
        };
        match text.trim().parse::<f64>() {
            Ok(v) => self.relay(visitor.visit_f64(v)),
            Err(_) => Err(self.fail(Problem::MalformedNumber, format!("`{text}` is not a number"))),
        }
    }

    fn visit_sequence<V: Visitor<'de>>(
        &self,
        items: Vec<(Segment, &'de RawTree)>,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        let access = SeqDeserializer { items: items.into_iter(), path: self.path.clone() };
        self.relay(visitor.visit_seq(access))
    }

    fn visit_mapping<V: Visitor<'de>>(&self, entries: Vec<Entry<'de>>, visitor: V) -> Result<V::Value, BindError> {
        let access = MapDeserializer { entries: entries.into_iter(), value: None, path: self.path.clone() };
        self.relay(visitor.visit_map(access))
    }
}

/// Mapping keys that are all non-negative integers, ordered by index.
fn indexed(map: &BTreeMap<String, RawTree>) -> Option<Vec<(Segment, &RawTree)>> {
    let mut items = map
        .iter()
        .map(|(key, value)| key.parse::<usize>().ok().map(|i| (i, key, value)))
        .collect::<Option<Vec<_>>>()?;
    items.sort_by_key(|(i, _, _)| *i);
    Some(items.into_iter().map(|(_, key, value)| (Segment::Key(key.clone()), value)).collect())
}

fn entries(map: &BTreeMap<String, RawTree>) -> Vec<Entry<'_>> {
    map.iter().map(|(key, value)| Entry { name: key, key, value }).collect()
}

/// Match keys to declared field names, exactly first, then ignoring ASCII case.
fn struct_entries<'de>(
    path: &FieldPath,
    map: &'de BTreeMap<String, RawTree>,
    fields: &'static [&'static str],
) -> Result<Vec<Entry<'de>>, BindError> {
    let mut out = Vec::with_capacity(map.len());
    let mut taken = HashSet::new();
    let mut rest = Vec::new();

    for (key, value) in map {
        match fields.iter().copied().find(|f| *f == key.as_str()) {
            Some(name) => {
                taken.insert(name);
                out.push(Entry { name, key, value });
            }
            None => rest.push((key, value)),
        }
    }
    for (key, value) in rest {
        match fields.iter().copied().find(|f| f.eq_ignore_ascii_case(key)) {
            Some(name) if taken.insert(name) => out.push(Entry { name, key, value }),
            _ => {
                return Err(BindError::at(
                    Problem::UnknownProperty,
                    &path.child(key.as_str()),
                    value,
                    format!("unknown property `{key}`"),
                ))
            }
        }
    }
    Ok(out)
}

macro_rules! integer_hints {
    ($($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
                self.deserialize_integer(visitor)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for TreeDeserializer<'de> {
    type Error = BindError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let result = match self.node {
            RawTree::Scalar(Scalar::Null) => visitor.visit_unit(),
            RawTree::Scalar(Scalar::Bool(v)) => visitor.visit_bool(*v),
            RawTree::Scalar(Scalar::Int(v)) => visitor.visit_i64(*v),
            RawTree::Scalar(Scalar::Float(v)) => visitor.visit_f64(*v),
            RawTree::Scalar(Scalar::Str(v)) => visitor.visit_borrowed_str(v),
            RawTree::Sequence(items) => {
                let items = items.iter().enumerate().map(|(i, item)| (Segment::Index(i), item)).collect();
                return self.visit_sequence(items, visitor);
            }
            RawTree::Mapping(map) => return self.visit_mapping(entries(map), visitor),
        };
        self.relay(result)
    }

    integer_hints!(deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64);

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_float(visitor)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_float(visitor)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let RawTree::Scalar(Scalar::Str(text)) = self.node else {
            return self.deserialize_any(visitor);
        };
        let text = text.trim();
        let value = if text.eq_ignore_ascii_case("true") {
            true
        } else if text.eq_ignore_ascii_case("false") {
            false
        } else {
            return Err(self.fail(Problem::MalformedString, format!("`{text}` is not a boolean")));
        };
        self.relay(visitor.visit_bool(value))
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let result = match self.node {
            RawTree::Scalar(Scalar::Str(v)) => visitor.visit_borrowed_str(v),
            RawTree::Scalar(scalar @ (Scalar::Bool(_) | Scalar::Int(_) | Scalar::Float(_))) => {
                visitor.visit_string(scalar.to_text())
            }
            _ => return self.deserialize_any(visitor),
        };
        self.relay(result)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_any(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_any(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        if self.node.is_null() {
            return self.relay(visitor.visit_none());
        }
        let (path, node) = (self.path.clone(), self.node);
        visitor.visit_some(self).map_err(|e| e.locate(&path, node))
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_any(visitor)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        self.deserialize_any(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        let (path, node) = (self.path.clone(), self.node);
        visitor.visit_newtype_struct(self).map_err(|e| e.locate(&path, node))
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self.node {
            RawTree::Scalar(Scalar::Null) => self.visit_sequence(Vec::new(), visitor),
            RawTree::Mapping(map) => match indexed(map) {
                Some(items) => self.visit_sequence(items, visitor),
                None => self.deserialize_any(visitor),
            },
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self.node {
            RawTree::Scalar(Scalar::Null) => self.visit_mapping(Vec::new(), visitor),
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        match self.node {
            RawTree::Scalar(Scalar::Null) => self.visit_mapping(Vec::new(), visitor),
            RawTree::Mapping(map) => {
                let entries = struct_entries(&self.path, map, fields)?;
                self.visit_mapping(entries, visitor)
            }
            _ => self.deserialize_any(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        let result = match self.node {
            RawTree::Scalar(Scalar::Str(text)) => {
                let declared = variants
                    .iter()
                    .copied()
                    .find(|v| *v == text.as_str())
                    .or_else(|| variants.iter().copied().find(|v| v.eq_ignore_ascii_case(text)));
                let name: &'de str = match declared {
                    Some(variant) => variant,
                    None => text,
                };
                visitor.visit_enum(BorrowedStrDeserializer::<BindError>::new(name))
            }
            RawTree::Mapping(map) if map.len() == 1 => match map.iter().next() {
                Some((variant, value)) => visitor.visit_enum(EnumDeserializer {
                    variant,
                    value,
                    path: self.path.child(variant.as_str()),
                }),
                None => return self.deserialize_any(visitor),
            },
            _ => return self.deserialize_any(visitor),
        };
        self.relay(result)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_unit()
    }
}

struct Entry<'de> {
    /// Name handed to the visitor: the declared field name for structs.
    name: &'de str,
    /// Key as it appears in the tree.
    key: &'de str,
    value: &'de RawTree,
}

struct MapDeserializer<'de> {
    entries: std::vec::IntoIter<Entry<'de>>,
    value: Option<(&'de str, &'de RawTree)>,
    path: FieldPath,
}

impl<'de> de::MapAccess<'de> for MapDeserializer<'de> {
    type Error = BindError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, BindError> {
        let Some(entry) = self.entries.next() else {
            return Ok(None);
        };
        self.value = Some((entry.key, entry.value));
        let key = KeyDeserializer { name: entry.name, path: self.path.child(entry.key) };
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, BindError> {
        let Some((key, value)) = self.value.take() else {
            return Err(de::Error::custom("value requested before key"));
        };
        seed.deserialize(TreeDeserializer::at(value, self.path.child(key)))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

struct SeqDeserializer<'de> {
    items: std::vec::IntoIter<(Segment, &'de RawTree)>,
    path: FieldPath,
}

impl<'de> de::SeqAccess<'de> for SeqDeserializer<'de> {
    type Error = BindError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, BindError> {
        match self.items.next() {
            Some((segment, node)) => seed.deserialize(TreeDeserializer::at(node, self.path.child(segment))).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

/// Mapping keys, parsed into whatever the target's key type is.
struct KeyDeserializer<'de> {
    name: &'de str,
    path: FieldPath,
}

impl KeyDeserializer<'_> {
    fn fail(&self, problem: Problem, message: String) -> BindError {
        BindError::at(problem, &self.path, &RawTree::string(self.name), message)
    }

    fn relay<T>(&self, result: Result<T, BindError>) -> Result<T, BindError> {
        result.map_err(|e| e.locate(&self.path, &RawTree::string(self.name)))
    }
}

macro_rules! key_hints {
    ($($method:ident => $ty:ty, $visit:ident;)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
                match self.name.trim().parse::<$ty>() {
                    Ok(v) => self.relay(visitor.$visit(v)),
                    Err(e) => Err(self.fail(Problem::MalformedNumber, format!("key `{}`: {e}", self.name))),
                }
            }
        )*
    };
}

impl<'de> Deserializer<'de> for KeyDeserializer<'de> {
    type Error = BindError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        self.relay(visitor.visit_borrowed_str(self.name))
    }

    key_hints! {
        deserialize_i8 => i64, visit_i64;
        deserialize_i16 => i64, visit_i64;
        deserialize_i32 => i64, visit_i64;
        deserialize_i64 => i64, visit_i64;
        deserialize_u8 => u64, visit_u64;
        deserialize_u16 => u64, visit_u64;
        deserialize_u32 => u64, visit_u64;
        deserialize_u64 => u64, visit_u64;
        deserialize_f32 => f64, visit_f64;
        deserialize_f64 => f64, visit_f64;
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        match self.name.to_ascii_lowercase().as_str() {
            "true" => self.relay(visitor.visit_bool(true)),
            "false" => self.relay(visitor.visit_bool(false)),
            _ => Err(self.fail(Problem::MalformedString, format!("key `{}` is not a boolean", self.name))),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let path = self.path.clone();
        let raw = RawTree::string(self.name);
        visitor.visit_some(self).map_err(|e| e.locate(&path, &raw))
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        let path = self.path.clone();
        let raw = RawTree::string(self.name);
        visitor.visit_newtype_struct(self).map_err(|e| e.locate(&path, &raw))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        self.relay(visitor.visit_enum(self.name.into_deserializer()))
    }

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf unit unit_struct seq tuple
        tuple_struct map struct identifier ignored_any
    }
}

struct EnumDeserializer<'de> {
    variant: &'de str,
    value: &'de RawTree,
    path: FieldPath,
}

impl<'de> de::EnumAccess<'de> for EnumDeserializer<'de> {
    type Error = BindError;
    type Variant = TreeDeserializer<'de>;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant), BindError> {
        let variant = seed.deserialize(BorrowedStrDeserializer::<BindError>::new(self.variant))?;
        Ok((variant, TreeDeserializer::at(self.value, self.path)))
    }
}

impl<'de> de::VariantAccess<'de> for TreeDeserializer<'de> {
    type Error = BindError;

    fn unit_variant(self) -> Result<(), BindError> {
        if self.node.is_null() || self.node.is_empty() {
            return Ok(());
        }
        Err(self.fail(Problem::TypeMismatch, "unit variant takes no value"))
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, BindError> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, BindError> {
        self.deserialize_seq(visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        self.deserialize_struct("", fields, visitor)
    }
}
