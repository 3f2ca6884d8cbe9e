//! Command-line arguments

use super::Gatherer;
use crate::error::SourceError;
use crate::tree::{expand_flat, RawTree};

/// Arguments of the form `<prefix>key=value` become parameters.
///
/// `--db.url=jdbc:x` with prefix `--` sets `db.url`. An argument without `=`
/// is a flag and sets its key to `"true"`. Arguments without the prefix are
/// left for the application.
#[derive(Debug, Clone)]
pub struct CommandLineArgumentsGatherer {
    args: Vec<String>,
    prefix: String,
}

impl CommandLineArgumentsGatherer {
    pub fn new<I, S>(args: I, prefix: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { args: args.into_iter().map(Into::into).collect(), prefix: prefix.into() }
    }

    /// The arguments of the running process, without the program name.
    pub fn from_env(prefix: impl Into<String>) -> Self {
        Self::new(std::env::args().skip(1), prefix)
    }

    fn pairs(&self) -> Vec<(&str, &str)> {
        self.args
            .iter()
            .filter_map(|arg| {
                let (key, value) = arg.split_once('=').unwrap_or((arg.as_str(), "true"));
                let key = key.strip_prefix(self.prefix.as_str())?;
                (!key.is_empty()).then_some((key, value))
            })
            .collect()
    }
}

impl Gatherer for CommandLineArgumentsGatherer {
    fn name(&self) -> String {
        format!("Command line ({})", self.prefix)
    }

    fn gather(&self) -> Result<RawTree, SourceError> {
        Ok(expand_flat(self.pairs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefixed_pairs_become_parameters() {
        let tree = CommandLineArgumentsGatherer::new(
            ["--db.url=jdbc:x=1", "--verbose", "positional", "-v", "--servers[0]=a"],
            "--",
        )
        .gather()
        .expect("gather");
        assert_eq!(
            tree,
            RawTree::from(json!({"db": {"url": "jdbc:x=1"}, "verbose": "true", "servers": {"0": "a"}}))
        );
    }

    #[test]
    fn empty_prefix_takes_every_argument() {
        let tree = CommandLineArgumentsGatherer::new(["port=80"], "").gather().expect("gather");
        assert_eq!(tree, RawTree::from(json!({"port": "80"})));
    }

    #[test]
    fn bare_prefix_is_ignored() {
        let tree = CommandLineArgumentsGatherer::new(["--", "--=x"], "--").gather().expect("gather");
        assert_eq!(tree, RawTree::empty());
    }
}
