//! Builder for a configured parameter loader

use crate::aggregate::Aggregator;
use crate::describe::{describe, ParameterDoc};
use crate::error::{AggregateError, MapperError, SecretsError, SerializeError};
use crate::gather::{
    CommandLineArgumentsGatherer, DirGatherer, EnvironmentVariablesGatherer, FigmentGatherer, FileGatherer,
    Gatherer, ResourceGatherer, SecretsGatherer, SystemPropertiesGatherer,
};
use crate::handler::{DefaultErrorHandler, ErrorHandler};
use crate::mapper::{to_tree, Format};
use crate::secrets::{find_secret_fields, SecretField, SecretsSerializer, Walk};
use crate::tree::RawTree;
use figment::Figment;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

/// The conventional source stack, applied in field order.
///
/// Resource first, then configuration directory, system properties,
/// environment, command line, and secrets last. Unset slots are skipped.
#[derive(Debug, Clone, Default)]
pub struct StandardSources {
    pub resource: Option<ResourceGatherer>,
    pub dir: Option<DirGatherer>,
    pub system_properties: Option<SystemPropertiesGatherer>,
    pub environment: Option<EnvironmentVariablesGatherer>,
    pub command_line: Option<CommandLineArgumentsGatherer>,
    pub secrets: Option<SecretsGatherer>,
}

impl StandardSources {
    /// Environment under `<APP>_`, command line under `--`, and the optional
    /// config directory and secrets root.
    pub fn for_app(app: &str, dir: Option<PathBuf>, secrets: Option<PathBuf>) -> Self {
        let prefix = format!("{}_", app.to_ascii_uppercase());
        Self {
            resource: None,
            dir: dir.map(DirGatherer::new),
            system_properties: None,
            environment: Some(EnvironmentVariablesGatherer::new(prefix)),
            command_line: Some(CommandLineArgumentsGatherer::from_env("--")),
            secrets: secrets.map(SecretsGatherer::new),
        }
    }

    fn into_gatherers(self) -> Vec<Arc<dyn Gatherer>> {
        let mut out: Vec<Arc<dyn Gatherer>> = Vec::new();
        if let Some(g) = self.resource {
            out.push(Arc::new(g));
        }
        if let Some(g) = self.dir {
            out.push(Arc::new(g));
        }
        if let Some(g) = self.system_properties {
            out.push(Arc::new(g));
        }
        if let Some(g) = self.environment {
            out.push(Arc::new(g));
        }
        if let Some(g) = self.command_line {
            out.push(Arc::new(g));
        }
        if let Some(g) = self.secrets {
            out.push(Arc::new(g));
        }
        out
    }
}

/// Collects sources and settings, then produces a [`Params`] loader.
///
/// Sources are applied in the order they are added.
pub struct ParamsFactory<T> {
    gatherers: Vec<Arc<dyn Gatherer>>,
    handler: Arc<dyn ErrorHandler>,
    format: Format,
    defaults: Option<RawTree>,
    _target: PhantomData<fn() -> T>,
}

impl<T> Default for ParamsFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ParamsFactory<T> {
    pub fn new() -> Self {
        Self {
            gatherers: Vec::new(),
            handler: Arc::new(DefaultErrorHandler),
            format: Format::default(),
            defaults: None,
            _target: PhantomData,
        }
    }

    pub fn with_gatherer(mut self, gatherer: impl Gatherer + 'static) -> Self {
        self.gatherers.push(Arc::new(gatherer));
        self
    }

    pub fn with_resource_gatherer(self, name: &str, format: Format, text: &'static str) -> Self {
        self.with_gatherer(ResourceGatherer::embedded(name, format, text))
    }

    pub fn with_file_gatherer(self, path: impl Into<PathBuf>) -> Self {
        self.with_gatherer(FileGatherer::new(path))
    }

    pub fn with_dir_gatherer(self, dir: impl Into<PathBuf>, formats: impl IntoIterator<Item = Format>) -> Self {
        self.with_gatherer(DirGatherer::new(dir).with_formats(formats))
    }

    pub fn with_system_properties_gatherer<I, K, V>(self, properties: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.with_gatherer(SystemPropertiesGatherer::new(properties, prefix))
    }

    pub fn with_environment_variables_gatherer(self, prefix: &str) -> Self {
        self.with_gatherer(EnvironmentVariablesGatherer::new(prefix))
    }

    pub fn with_command_line_arguments_gatherer<I, S>(self, args: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_gatherer(CommandLineArgumentsGatherer::new(args, prefix))
    }

    pub fn with_secrets_gatherer(self, root: impl Into<PathBuf>) -> Self {
        self.with_gatherer(SecretsGatherer::new(root))
    }

    pub fn with_figment(self, name: &str, figment: Figment) -> Self {
        self.with_gatherer(FigmentGatherer::new(name, figment))
    }

    pub fn with_standard_sources(mut self, sources: StandardSources) -> Self {
        self.gatherers.extend(sources.into_gatherers());
        self
    }

    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Format of masked dumps produced by [`Params::to_masked_string`].
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Start every aggregation from `defaults` instead of an empty tree.
    pub fn with_defaults(mut self, defaults: &T) -> Result<Self, MapperError>
    where
        T: Serialize,
    {
        self.defaults = Some(to_tree(defaults)?);
        Ok(self)
    }

    pub fn create(self) -> Params<T> {
        let mut aggregator = Aggregator::new(self.gatherers, self.handler);
        if let Some(defaults) = self.defaults {
            aggregator = aggregator.with_defaults(defaults);
        }
        Params { aggregator, serializer: SecretsSerializer::new(self.format), _target: PhantomData }
    }
}

/// A configured loader for `T`.
///
/// Cheap to clone and safe to share; each [`gather`](Params::gather) call
/// reads every source afresh.
pub struct Params<T> {
    aggregator: Aggregator,
    serializer: SecretsSerializer,
    _target: PhantomData<fn() -> T>,
}

impl<T> Clone for Params<T> {
    fn clone(&self) -> Self {
        Self { aggregator: self.aggregator.clone(), serializer: self.serializer, _target: PhantomData }
    }
}

impl<T> Params<T>
where
    T: DeserializeOwned + Serialize + Walk + Clone,
{
    pub fn gather(&self) -> Result<T, AggregateError> {
        self.aggregator.aggregate()
    }

    /// Dump `params` with every secret masked.
    pub fn to_masked_string(&self, params: &T) -> Result<String, SerializeError> {
        self.serializer.serialize(params)
    }

    pub fn secret_fields(&self, params: &T) -> Result<Vec<SecretField>, SecretsError> {
        find_secret_fields(params)
    }

    /// Every parameter of `defaults` with its kind and masked default.
    pub fn describe(&self, defaults: &T) -> Result<Vec<ParameterDoc>, SerializeError> {
        describe(defaults)
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }
}
