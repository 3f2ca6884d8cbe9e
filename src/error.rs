//! Error types

use crate::handler::Problem;
use crate::tree::{FieldPath, RawTree, Scalar};
use serde::de;
use std::fmt;
use std::path::PathBuf;

/// A gatherer could not produce its tree.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cannot read {}: {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("cannot parse {origin}: {error}")]
    Parse {
        origin: String,
        #[source]
        error: MapperError,
    },

    #[error("source produced a {kind} where a mapping was expected")]
    InvalidRoot { kind: &'static str },

    #[error(transparent)]
    Provider(#[from] Box<figment::Error>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SourceError {
    pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        SourceError::Io { path: path.into(), error }
    }
}

/// Text-mapper failures: parsing source text or writing a typed value.
#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("cannot write TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("invalid properties at line {line}: {message}")]
    Properties { line: usize, message: String },
}

/// A secrets walk or injection failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretsError {
    #[error("no secret field at `{path}`")]
    PathNotFound { path: FieldPath },

    #[error("cycle detected at `{path}`: `{type_name}` is already being visited")]
    CyclicGraph { path: FieldPath, type_name: &'static str },

    #[error("secret at `{path}` sits in a shared node; masking a copy would change the original")]
    SharedSecret { path: FieldPath },

    #[error("`{type_name}` is already borrowed elsewhere")]
    Borrowed { type_name: &'static str },
}

/// The single fatal error returned by an aggregation call.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("source `{source_name}` failed: {error}")]
    Source {
        source_name: String,
        #[source]
        error: SourceError,
    },

    #[error("cannot bind parameters{}: {error}", from_source(.source_name))]
    Binding {
        source_name: Option<String>,
        #[source]
        error: BindError,
    },

    #[error("cannot apply secrets from `{source_name}`: {error}")]
    Secrets {
        source_name: String,
        #[source]
        error: SecretsError,
    },
}

impl AggregateError {
    /// The path the failure points at, when there is one.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            AggregateError::Binding { error, .. } => Some(error.path()),
            AggregateError::Secrets {
                error: SecretsError::PathNotFound { path } | SecretsError::CyclicGraph { path, .. },
                ..
            } => Some(path),
            _ => None,
        }
    }
}

fn from_source(source_name: &Option<String>) -> String {
    match source_name {
        Some(name) => format!(" (value from `{name}`)"),
        None => String::new(),
    }
}

/// Writing a masked dump failed.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error(transparent)]
    Secrets(#[from] SecretsError),

    #[error(transparent)]
    Mapper(#[from] MapperError),
}

/// A typed-binding problem at a specific path.
///
/// Raised by the tree deserializer and by `serde`-derived visitors through
/// [`de::Error`]. Visitor errors are created without a location and picked up
/// by the innermost node that sees them.
#[derive(Debug, Clone)]
pub struct BindError {
    problem: Option<Problem>,
    path: FieldPath,
    raw: Option<RawTree>,
    message: String,
    located: bool,
    missing: Option<String>,
}

impl BindError {
    pub(crate) fn at(problem: Problem, path: &FieldPath, raw: &RawTree, message: impl Into<String>) -> Self {
        Self {
            problem: Some(problem),
            path: path.clone(),
            raw: Some(raw.clone()),
            message: message.into(),
            located: true,
            missing: None,
        }
    }

    fn unlocated(problem: Option<Problem>, message: String) -> Self {
        Self { problem, path: FieldPath::root(), raw: None, message, located: false, missing: None }
    }

    /// Attach the location of `node` unless a deeper node already did.
    pub(crate) fn locate(mut self, path: &FieldPath, node: &RawTree) -> Self {
        if self.located {
            return self;
        }
        self.located = true;
        match self.missing.take() {
            Some(field) => {
                self.path = path.child(field);
                self.raw = None;
                self.problem = Some(Problem::MissingProperty);
            }
            None => {
                self.path = path.clone();
                self.problem = self.problem.or_else(|| Some(problem_for(node)));
                self.raw = Some(node.clone());
            }
        }
        self
    }

    pub fn problem(&self) -> Problem {
        self.problem.unwrap_or(Problem::TypeMismatch)
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// The offending value, when the problem is tied to one.
    pub fn raw(&self) -> Option<&RawTree> {
        self.raw.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Classify a visitor's free-form error by what it was handed.
fn problem_for(node: &RawTree) -> Problem {
    match node {
        RawTree::Scalar(Scalar::Str(_)) => Problem::MalformedString,
        RawTree::Scalar(Scalar::Int(_) | Scalar::Float(_)) => Problem::MalformedNumber,
        _ => Problem::TypeMismatch,
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at `{}`: {}", self.problem(), self.path, self.message)
    }
}

impl std::error::Error for BindError {}

impl de::Error for BindError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::unlocated(None, msg.to_string())
    }

    fn invalid_type(unexp: de::Unexpected<'_>, exp: &dyn de::Expected) -> Self {
        Self::unlocated(
            Some(Problem::TypeMismatch),
            format!("invalid type: {}, expected {}", unexp, exp),
        )
    }

    fn invalid_value(unexp: de::Unexpected<'_>, exp: &dyn de::Expected) -> Self {
        let problem = match unexp {
            de::Unexpected::Signed(_) | de::Unexpected::Unsigned(_) | de::Unexpected::Float(_) => {
                Problem::MalformedNumber
            }
            _ => Problem::MalformedString,
        };
        Self::unlocated(Some(problem), format!("invalid value: {}, expected {}", unexp, exp))
    }

    fn invalid_length(len: usize, exp: &dyn de::Expected) -> Self {
        Self::unlocated(
            Some(Problem::TypeMismatch),
            format!("invalid length {}, expected {}", len, exp),
        )
    }

    fn unknown_variant(variant: &str, expected: &'static [&'static str]) -> Self {
        Self::unlocated(
            Some(Problem::MalformedString),
            format!("unknown variant `{}`, expected one of {:?}", variant, expected),
        )
    }

    fn unknown_field(field: &str, expected: &'static [&'static str]) -> Self {
        Self::unlocated(
            Some(Problem::UnknownProperty),
            format!("unknown field `{}`, expected one of {:?}", field, expected),
        )
    }

    fn missing_field(field: &'static str) -> Self {
        let mut error =
            Self::unlocated(Some(Problem::MissingProperty), format!("missing field `{}`", field));
        error.missing = Some(field.to_string());
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::Error as _;

    #[test]
    fn visitor_errors_take_innermost_location() {
        let node = RawTree::string("abc");
        let inner = FieldPath::parse("db.port");
        let error = BindError::invalid_type(de::Unexpected::Str("abc"), &"u16")
            .locate(&inner, &node)
            .locate(&FieldPath::parse("db"), &RawTree::empty());
        assert_eq!(error.path(), &inner);
        assert_eq!(error.problem(), Problem::TypeMismatch);
        assert_eq!(error.raw(), Some(&node));
    }

    #[test]
    fn custom_errors_are_classified_by_value() {
        let error = BindError::custom("bad").locate(&FieldPath::parse("a"), &RawTree::from(3i64));
        assert_eq!(error.problem(), Problem::MalformedNumber);
        let error = BindError::custom("bad").locate(&FieldPath::parse("a"), &RawTree::string("x"));
        assert_eq!(error.problem(), Problem::MalformedString);
    }

    #[test]
    fn missing_field_points_below_struct() {
        let error = BindError::missing_field("url").locate(&FieldPath::parse("db"), &RawTree::empty());
        assert_eq!(error.path().to_string(), "db.url");
        assert_eq!(error.problem(), Problem::MissingProperty);
        assert!(error.raw().is_none());
    }

    #[test]
    fn aggregate_error_names_source() {
        let error = AggregateError::Binding {
            source_name: Some("Environment (APP_)".into()),
            error: BindError::at(
                Problem::MalformedNumber,
                &FieldPath::parse("port"),
                &RawTree::string("eighty"),
                "invalid digit found in string",
            ),
        };
        assert_eq!(
            error.to_string(),
            "cannot bind parameters (value from `Environment (APP_)`): malformed number at `port`: invalid digit found in string"
        );
        assert_eq!(error.path().map(ToString::to_string).as_deref(), Some("port"));
    }
}
