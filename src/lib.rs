//! Layered parameter loading with secret-aware dumps.
//!
//! Parameters for a typed struct are gathered from an ordered list of
//! sources (embedded resources, configuration directories, process
//! properties, environment variables, command-line arguments, secret
//! volumes), merged so that later sources win per leaf, and bound with
//! `serde` under a configurable error policy. Fields declared secret with
//! [`impl_walk!`] receive values from secret volumes and are masked in every
//! dump produced by [`SecretsSerializer`].
//!
//! ```no_run
//! use layered_params::{impl_walk, Format, ParamsFactory};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Db {
//!     url: String,
//!     #[serde(default)]
//!     password: Option<String>,
//! }
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct App {
//!     port: u16,
//!     db: Db,
//! }
//!
//! impl_walk!(Db { secret: [password] });
//! impl_walk!(App { nested: [db] });
//!
//! let params = ParamsFactory::<App>::new()
//!     .with_resource_gatherer("app.yaml", Format::Yaml, "port: 8080\ndb:\n  url: postgres://db\n")
//!     .with_environment_variables_gatherer("APP_")
//!     .with_secrets_gatherer("/run/secrets/app")
//!     .create();
//! let app = params.gather()?;
//! println!("{}", params.to_masked_string(&app)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod aggregate;
pub mod describe;
pub mod error;
pub mod factory;
pub mod gather;
pub mod handler;
pub mod mapper;
pub mod secrets;
pub mod tree;

pub use aggregate::Aggregator;
pub use describe::{describe, ParameterDoc};
pub use error::{AggregateError, BindError, MapperError, SecretsError, SerializeError, SourceError};
pub use factory::{Params, ParamsFactory, StandardSources};
pub use gather::{
    CommandLineArgumentsGatherer, DirGatherer, EnvironmentVariablesGatherer, FigmentGatherer, FileGatherer,
    Gathered, Gatherer, ResourceGatherer, SecretsGatherer, SourceKind, StaticGatherer, SystemPropertiesGatherer,
};
pub use handler::{
    DefaultErrorHandler, ErrorContext, ErrorHandler, LenientErrorHandler, Problem, Resolution, StrictErrorHandler,
};
pub use mapper::Format;
pub use secrets::{
    find_secret_fields, inject_secret, mask_in_place, masked_copy, SecretField, SecretsSerializer, Walk, MASK,
};
pub use tree::{FieldPath, RawTree, Scalar, Segment};
