//! Text mapper: source text to [`RawTree`], typed values back to text

mod bind;
mod de;
pub mod properties;

pub use bind::{bind, bind_with};

use crate::error::MapperError;
use crate::tree::RawTree;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Supported text formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    Json,
    #[default]
    Yaml,
    Toml,
    Properties,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Properties, Format::Yaml, Format::Json, Format::Toml];

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Format::Json => &["json"],
            Format::Yaml => &["yaml", "yml"],
            Format::Toml => &["toml"],
            Format::Properties => &["properties"],
        }
    }

    /// Pick a format from a file extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Format> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Format::ALL.into_iter().find(|f| f.extensions().contains(&ext.as_str()))
    }

    /// Parse source text. Empty text and a null document give an empty mapping.
    pub fn parse(self, text: &str) -> Result<RawTree, MapperError> {
        if text.trim().is_empty() {
            return Ok(RawTree::empty());
        }
        let tree = match self {
            Format::Json => serde_json::from_str::<RawTree>(text)?,
            Format::Yaml => serde_yaml::from_str::<RawTree>(text)?,
            Format::Toml => toml::from_str::<RawTree>(text)?,
            Format::Properties => properties::parse(text)?,
        };
        Ok(if tree.is_null() { RawTree::empty() } else { tree })
    }

    pub fn write<T: Serialize + ?Sized>(self, value: &T) -> Result<String, MapperError> {
        Ok(match self {
            Format::Json => serde_json::to_string_pretty(value)?,
            Format::Yaml => serde_yaml::to_string(value)?,
            Format::Toml => toml::to_string_pretty(value)?,
            Format::Properties => properties::write(&to_tree(value)?),
        })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Json => "JSON",
            Format::Yaml => "YAML",
            Format::Toml => "TOML",
            Format::Properties => "properties",
        })
    }
}

/// Serialize a typed value into a [`RawTree`].
pub fn to_tree<T: Serialize + ?Sized>(value: &T) -> Result<RawTree, MapperError> {
    Ok(RawTree::from(serde_json::to_value(value)?))
}
