//! Parameter sources.
//!
//! Every gatherer turns one source into a [`RawTree`] rooted at a mapping.
//! Sources that do not exist contribute an empty mapping; sources that exist
//! but cannot be read or parsed fail the aggregation.

mod args;
mod env;
mod file;
mod props;
mod provider;
mod secrets;

pub use self::args::CommandLineArgumentsGatherer;
pub use self::env::EnvironmentVariablesGatherer;
pub use self::file::{DirGatherer, FileGatherer, ResourceGatherer};
pub use self::props::SystemPropertiesGatherer;
pub use self::provider::FigmentGatherer;
pub use self::secrets::SecretsGatherer;

use crate::error::SourceError;
use crate::mapper::Format;
use crate::tree::RawTree;
use encoding_rs::{Encoding, UTF_8};
use std::path::Path;

/// How the aggregator uses a gathered tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Merged into the tree that is bound to the target type.
    #[default]
    Plain,
    /// Laid over the plain sources last. Every leaf must bind to a declared
    /// secret field.
    Secrets,
}

pub trait Gatherer: Send + Sync {
    /// Display name used in logs and error messages, e.g. `Environment (APP_)`.
    fn name(&self) -> String;

    fn kind(&self) -> SourceKind {
        SourceKind::Plain
    }

    fn gather(&self) -> Result<RawTree, SourceError>;
}

/// One source's contribution, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Gathered {
    pub source: String,
    pub kind: SourceKind,
    pub tree: RawTree,
}

impl Gathered {
    /// Run `gatherer` and normalize its root to a mapping.
    pub fn collect(gatherer: &dyn Gatherer) -> Result<Self, SourceError> {
        let tree = normalize_root(gatherer.gather()?)?;
        Ok(Self { source: gatherer.name(), kind: gatherer.kind(), tree })
    }
}

/// A null root becomes an empty mapping. Any other non-mapping root is an error.
pub fn normalize_root(tree: RawTree) -> Result<RawTree, SourceError> {
    match tree {
        RawTree::Mapping(_) => Ok(tree),
        tree if tree.is_null() => Ok(RawTree::empty()),
        tree => Err(SourceError::InvalidRoot { kind: tree.kind_name() }),
    }
}

/// A fixed tree, mostly useful for defaults and tests.
#[derive(Debug, Clone)]
pub struct StaticGatherer {
    name: String,
    tree: RawTree,
}

impl StaticGatherer {
    pub fn new(name: impl Into<String>, tree: impl Into<RawTree>) -> Self {
        Self { name: name.into(), tree: tree.into() }
    }
}

impl Gatherer for StaticGatherer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn gather(&self) -> Result<RawTree, SourceError> {
        Ok(self.tree.clone())
    }
}

/// Read a text file. A missing file gives `None`.
pub(crate) fn read_optional(path: &Path, encoding: &'static Encoding) -> Result<Option<String>, SourceError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SourceError::io(path, e)),
    };
    Ok(Some(decode(path, &bytes, encoding)))
}

/// Decode `bytes`, honouring a BOM when there is one.
pub(crate) fn decode(path: &Path, bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::warn!(path = %path.display(), encoding = used.name(), "replaced undecodable bytes");
    }
    text.into_owned()
}

/// Read and parse a configuration file. A missing file gives `None`.
pub(crate) fn parse_file(path: &Path, format: Format) -> Result<Option<RawTree>, SourceError> {
    let Some(text) = read_optional(path, UTF_8)? else {
        tracing::debug!(path = %path.display(), "no such file, skipping");
        return Ok(None);
    };
    format
        .parse(&text)
        .map(Some)
        .map_err(|error| SourceError::Parse { origin: path.display().to_string(), error })
}
