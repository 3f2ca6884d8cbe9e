//! Gather, merge, bind, check secrets

use crate::error::{AggregateError, SecretsError};
use crate::gather::{Gathered, Gatherer, SourceKind};
use crate::handler::{DefaultErrorHandler, ErrorHandler};
use crate::mapper::bind_with;
use crate::secrets::{find_secret_fields, Walk};
use crate::tree::{merge, set_at, FieldPath, Provenance, RawTree};
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub const DEFAULTS_SOURCE: &str = "Defaults";

/// Runs an ordered list of gatherers into one typed value.
///
/// Plain sources are merged in order, later sources winning per leaf. Secrets
/// sources are laid over the result last, leaf by leaf, and the whole tree is
/// bound under the error handler. Every secret leaf must then sit on a
/// declared secret field. The aggregator keeps no state between calls and may
/// be shared across threads.
#[derive(Clone)]
pub struct Aggregator {
    gatherers: Vec<Arc<dyn Gatherer>>,
    handler: Arc<dyn ErrorHandler>,
    defaults: Option<RawTree>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Vec::new(), Arc::new(DefaultErrorHandler))
    }
}

impl Aggregator {
    pub fn new(gatherers: Vec<Arc<dyn Gatherer>>, handler: Arc<dyn ErrorHandler>) -> Self {
        Self { gatherers, handler, defaults: None }
    }

    /// A base layer applied beneath every source.
    pub fn with_defaults(mut self, defaults: RawTree) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn gatherers(&self) -> &[Arc<dyn Gatherer>] {
        &self.gatherers
    }

    /// Run every gatherer in order. The first failure aborts.
    pub fn gather_all(&self) -> Result<Vec<Gathered>, AggregateError> {
        self.gatherers
            .iter()
            .map(|gatherer| {
                let gathered = Gathered::collect(gatherer.as_ref())
                    .map_err(|error| AggregateError::Source { source_name: gatherer.name(), error })?;
                tracing::debug!(
                    source = %gathered.source,
                    kind = ?gathered.kind,
                    nodes = gathered.tree.node_count(),
                    "gathered source"
                );
                Ok(gathered)
            })
            .collect()
    }

    /// Merge the plain sources, recording which one set each path.
    pub fn merge_plain(&self, gathered: &[Gathered]) -> (RawTree, Provenance) {
        let mut provenance = Provenance::new();
        let mut merged = RawTree::empty();
        if let Some(defaults) = &self.defaults {
            provenance.record(defaults, DEFAULTS_SOURCE);
            merged = defaults.clone();
        }
        for layer in gathered.iter().filter(|g| g.kind == SourceKind::Plain) {
            provenance.record(&layer.tree, &layer.source);
            merged = merge(merged, layer.tree.clone());
        }
        (merged, provenance)
    }

    pub fn aggregate<T>(&self) -> Result<T, AggregateError>
    where
        T: DeserializeOwned + Walk,
    {
        let gathered = self.gather_all()?;
        let (mut merged, mut provenance) = self.merge_plain(&gathered);
        let placed = overlay_secrets(&gathered, &mut merged, &mut provenance);

        let value: T = bind_with(merged, self.handler.as_ref(), Some(&provenance)).map_err(|error| {
            let source_name = provenance.source_of(error.path()).map(str::to_string);
            AggregateError::Binding { source_name, error }
        })?;
        check_secret_targets(&value, &placed)?;

        tracing::info!(sources = gathered.len(), secrets = placed.len(), "parameters aggregated");
        Ok(value)
    }
}

/// A secret leaf and the source that supplied it.
struct PlacedSecret {
    path: FieldPath,
    source: String,
}

/// Lay every secrets-kind tree over `merged`, in order, one leaf at a time.
fn overlay_secrets(gathered: &[Gathered], merged: &mut RawTree, provenance: &mut Provenance) -> Vec<PlacedSecret> {
    let mut placed = Vec::new();
    for layer in gathered.iter().filter(|g| g.kind == SourceKind::Secrets) {
        for (path, scalar) in layer.tree.leaves() {
            set_at(merged, &path, RawTree::Scalar(scalar.clone()));
            provenance.record_path(&path, &layer.source);
            tracing::trace!(source = %layer.source, %path, "placed secret");
            placed.push(PlacedSecret { path, source: layer.source.clone() });
        }
    }
    placed
}

/// Fail unless every placed secret ended up on a declared secret field.
fn check_secret_targets<T: Walk>(value: &T, placed: &[PlacedSecret]) -> Result<(), AggregateError> {
    let Some(first) = placed.first() else {
        return Ok(());
    };
    let declared = find_secret_fields(value)
        .map_err(|error| AggregateError::Secrets { source_name: first.source.clone(), error })?;
    for secret in placed {
        if !declared.iter().any(|field| same_field(&field.path, &secret.path)) {
            return Err(AggregateError::Secrets {
                source_name: secret.source.clone(),
                error: SecretsError::PathNotFound { path: secret.path.clone() },
            });
        }
    }
    Ok(())
}

/// Path equality with keys compared ignoring ASCII case, as binding does.
fn same_field(declared: &FieldPath, leaf: &FieldPath) -> bool {
    declared.len() == leaf.len()
        && declared
            .segments()
            .iter()
            .zip(leaf.segments())
            .all(|(a, b)| a.matches(b) || a.as_key().eq_ignore_ascii_case(&b.as_key()))
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.gatherers.iter().map(|g| g.name()).collect();
        f.debug_struct("Aggregator")
            .field("gatherers", &names)
            .field("defaults", &self.defaults.is_some())
            .finish()
    }
}
