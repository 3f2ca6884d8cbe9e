//! Environment variables

use super::Gatherer;
use crate::error::SourceError;
use crate::tree::{insert_at, FieldPath, RawTree};

/// Variables named `<PREFIX><KEY>` become parameters.
///
/// The prefix is matched ignoring ASCII case and removed. `__` separates
/// nesting levels by default, so `APP_DB__MAX_POOL=8` sets `db.max_pool`.
/// A single `_` stays part of the key, which keeps snake_case fields
/// reachable; use [`separator`](Self::separator) with `"_"` to split on
/// every underscore instead. Keys are lower-cased unless case preservation
/// is switched on. Variables whose name or value is not valid UTF-8 are
/// skipped.
#[derive(Debug, Clone)]
pub struct EnvironmentVariablesGatherer {
    prefix: String,
    separator: String,
    preserve_case: bool,
    vars: Option<Vec<(String, String)>>,
}

impl EnvironmentVariablesGatherer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), separator: "__".into(), preserve_case: false, vars: None }
    }

    /// Nesting separator. An empty separator is ignored.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        if !separator.is_empty() {
            self.separator = separator;
        }
        self
    }

    pub fn preserve_case(mut self, preserve_case: bool) -> Self {
        self.preserve_case = preserve_case;
        self
    }

    /// Read from `vars` instead of the process environment.
    pub fn with_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    fn snapshot(&self) -> Vec<(String, String)> {
        if let Some(vars) = &self.vars {
            return vars.clone();
        }
        std::env::vars_os()
            .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
                (Ok(name), Ok(value)) => Some((name, value)),
                (name, _) => {
                    tracing::trace!(?name, "skipping non UTF-8 environment variable");
                    None
                }
            })
            .collect()
    }

    fn key_path(&self, name: &str) -> Option<FieldPath> {
        let head = name.get(..self.prefix.len())?;
        if !head.eq_ignore_ascii_case(&self.prefix) {
            return None;
        }
        let rest = &name[self.prefix.len()..];
        if rest.is_empty() {
            return None;
        }
        let mut path = FieldPath::root();
        for part in rest.split(self.separator.as_str()) {
            if part.is_empty() {
                tracing::trace!(name, "skipping variable with an empty key segment");
                return None;
            }
            if self.preserve_case {
                path.push(part);
            } else {
                path.push(part.to_lowercase());
            }
        }
        Some(path)
    }
}

impl Gatherer for EnvironmentVariablesGatherer {
    fn name(&self) -> String {
        format!("Environment ({})", self.prefix)
    }

    fn gather(&self) -> Result<RawTree, SourceError> {
        let mut vars = self.snapshot();
        vars.sort();

        let mut tree = RawTree::empty();
        for (name, value) in vars {
            if let Some(path) = self.key_path(&name) {
                insert_at(&mut tree, &path, RawTree::string(value));
            }
        }
        Ok(tree)
    }
}
