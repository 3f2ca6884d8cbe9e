//! Parameter listings for help output and documentation

use crate::error::SerializeError;
use crate::mapper::to_tree;
use crate::secrets::{find_secret_fields, Walk, MASK};
use crate::tree::{FieldPath, RawTree, Scalar};
use serde::Serialize;

/// One parameter as seen from a defaults value.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDoc {
    pub path: FieldPath,
    /// Kind of the default value (`string`, `integer`, ...). Secrets are always `string`.
    pub kind: &'static str,
    /// The default in flat-key form, or the mask for secrets. `None` when unset.
    pub default: Option<String>,
    pub secret: bool,
}

/// List every parameter `defaults` serializes, sorted by path.
///
/// Secret defaults are replaced by [`MASK`]. Secret fields without a value
/// are still listed. Empty maps and sequences contribute nothing.
pub fn describe<T>(defaults: &T) -> Result<Vec<ParameterDoc>, SerializeError>
where
    T: Serialize + Walk + ?Sized,
{
    let secrets = find_secret_fields(defaults)?;
    let tree = to_tree(defaults)?;

    let mut docs: Vec<ParameterDoc> = tree
        .leaves()
        .into_iter()
        .map(|(path, scalar)| {
            let secret = secrets.iter().any(|field| field.path.matches(&path));
            let default = match scalar {
                Scalar::Null => None,
                _ if secret => Some(MASK.to_string()),
                other => Some(other.to_text()),
            };
            let kind = if secret { "string" } else { RawTree::Scalar(scalar.clone()).kind_name() };
            ParameterDoc { path, kind, default, secret }
        })
        .collect();

    for field in &secrets {
        if !docs.iter().any(|doc| doc.path.matches(&field.path)) {
            docs.push(ParameterDoc { path: field.path.clone(), kind: "string", default: None, secret: true });
        }
    }
    docs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(docs)
}
