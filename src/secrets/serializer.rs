//! Masked text dumps of parameter objects

use super::{masked_copy, Walk};
use crate::error::SerializeError;
use crate::mapper::Format;
use serde::Serialize;

/// Writes parameters in a text format with every secret replaced by the mask.
///
/// The output differs from `Format::write` on the same value only at secret
/// leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretsSerializer {
    format: Format,
}

impl SecretsSerializer {
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn serialize<T>(&self, root: &T) -> Result<String, SerializeError>
    where
        T: Walk + Clone + Serialize,
    {
        let masked = masked_copy(root)?;
        Ok(self.format.write(&masked)?)
    }
}
