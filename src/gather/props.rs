//! Process-level properties

use super::Gatherer;
use crate::error::SourceError;
use crate::tree::{expand_flat, RawTree};

/// Flat `key=value` properties supplied by the host process, filtered by a
/// key prefix that is removed before nesting.
///
/// Keys are split on `.` and `[n]` like properties files. Matching is exact,
/// case included.
#[derive(Debug, Clone, Default)]
pub struct SystemPropertiesGatherer {
    properties: Vec<(String, String)>,
    prefix: String,
}

impl SystemPropertiesGatherer {
    pub fn new<I, K, V>(properties: I, prefix: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            prefix: prefix.into(),
        }
    }

    /// Collect `-Dkey=value` definitions from `args`. `-Dflag` alone sets `"true"`.
    pub fn from_define_flags<I, S>(args: I, prefix: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let properties = args
            .into_iter()
            .filter_map(|arg| {
                let define = arg.as_ref().strip_prefix("-D")?;
                let (key, value) = define.split_once('=').unwrap_or((define, "true"));
                Some((key.to_string(), value.to_string()))
            })
            .collect();
        Self { properties, prefix: prefix.into() }
    }
}

impl Gatherer for SystemPropertiesGatherer {
    fn name(&self) -> String {
        format!("System properties ({})", self.prefix)
    }

    fn gather(&self) -> Result<RawTree, SourceError> {
        let selected = self.properties.iter().filter_map(|(key, value)| {
            let key = key.strip_prefix(self.prefix.as_str())?;
            (!key.is_empty()).then_some((key, value.as_str()))
        });
        Ok(expand_flat(selected))
    }
}
