//! Bind a merged tree to a typed value under an error policy

use super::de::TreeDeserializer;
use crate::error::BindError;
use crate::handler::{decide, ErrorContext, ErrorHandler, Problem, Resolution};
use crate::tree::{FieldPath, Provenance, RawTree};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Bind `tree` to `T`, asking `handler` about every recoverable problem.
pub fn bind<T: DeserializeOwned>(tree: RawTree, handler: &dyn ErrorHandler) -> Result<T, BindError> {
    bind_with(tree, handler, None)
}

/// [`bind`], naming the contributing source of each problem from `provenance`.
///
/// Each problem is decided once. The decision rewrites the tree (dropping or
/// nulling the offending node) and binding starts over. A problem that comes
/// back at a path already decided, or a decision that cannot change the
/// tree, is fatal.
pub fn bind_with<T: DeserializeOwned>(
    mut tree: RawTree,
    handler: &dyn ErrorHandler,
    provenance: Option<&Provenance>,
) -> Result<T, BindError> {
    let budget = tree.node_count() + 1;
    let mut decided: Vec<FieldPath> = Vec::new();

    loop {
        let error = match T::deserialize(TreeDeserializer::new(&tree)) {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if error.problem() == Problem::MissingProperty
            || decided.len() >= budget
            || decided.iter().any(|path| path == error.path())
        {
            return Err(error);
        }

        let source = provenance.and_then(|p| p.source_of(error.path())).map(str::to_string);
        let ctx = ErrorContext::from_error(&error, source);
        let resolution = decide(handler, &ctx);
        tracing::debug!(path = %error.path(), problem = %error.problem(), ?resolution, "binding problem resolved");

        let applied = match resolution {
            Resolution::Fail => false,
            // Nulling a key the target does not declare would only report it again.
            Resolution::UseDefault => tree.remove(error.path()).is_some(),
            Resolution::UseNull if error.problem() == Problem::UnknownProperty => {
                tree.remove(error.path()).is_some()
            }
            Resolution::UseNull => tree
                .replace(error.path(), RawTree::null())
                .is_some_and(|previous| !previous.is_null()),
        };
        if !applied {
            return Err(error);
        }
        decided.push(error.path().clone());
    }
}
