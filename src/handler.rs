//! Binding error policy
//!
//! The binder never raises a recoverable problem on its own. It describes it
//! in an [`ErrorContext`] and asks the configured [`ErrorHandler`] what to do.

use crate::error::BindError;
use crate::tree::{FieldPath, RawTree};
use std::fmt;

/// What went wrong while binding one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Problem {
    /// A key the target type does not declare.
    UnknownProperty,
    /// A value of the wrong kind, e.g. a mapping where a number belongs.
    TypeMismatch,
    /// A string that does not parse as the number the target expects.
    MalformedNumber,
    /// A string that does not parse as the target (bool, enum variant, char).
    MalformedString,
    /// A required field nobody supplied. Always fatal.
    MissingProperty,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Problem::UnknownProperty => "unknown property",
            Problem::TypeMismatch => "type mismatch",
            Problem::MalformedNumber => "malformed number",
            Problem::MalformedString => "malformed string",
            Problem::MissingProperty => "missing property",
        })
    }
}

/// Outcome of a handler decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Drop the offending node; the field falls back to its default.
    UseDefault,
    /// Bind the offending node as null.
    UseNull,
    /// Abort the aggregation.
    Fail,
}

/// Everything a handler gets to look at.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub path: FieldPath,
    pub raw: Option<RawTree>,
    pub problem: Problem,
    pub message: String,
    /// Name of the source that supplied the value, if known.
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn from_error(error: &BindError, source: Option<String>) -> Self {
        Self {
            path: error.path().clone(),
            raw: error.raw().cloned(),
            problem: error.problem(),
            message: error.message().to_string(),
            source,
        }
    }

    fn source_label(&self) -> &str {
        self.source.as_deref().unwrap_or("unknown source")
    }

    fn raw_kind(&self) -> &'static str {
        self.raw.as_ref().map(RawTree::kind_name).unwrap_or("nothing")
    }
}

/// Pluggable policy for recoverable binding problems.
///
/// One method per failure class. Handlers are shared across calls and
/// threads, so they must not keep per-call state.
pub trait ErrorHandler: Send + Sync {
    fn unknown_property(&self, ctx: &ErrorContext) -> Resolution;

    /// A value of the wrong kind for its target.
    fn unexpected_token(&self, ctx: &ErrorContext) -> Resolution;

    fn malformed_number(&self, ctx: &ErrorContext) -> Resolution;

    fn malformed_string(&self, ctx: &ErrorContext) -> Resolution;
}

/// Route `ctx` to the handler method for its problem.
pub fn decide(handler: &dyn ErrorHandler, ctx: &ErrorContext) -> Resolution {
    match ctx.problem {
        Problem::UnknownProperty => handler.unknown_property(ctx),
        Problem::TypeMismatch => handler.unexpected_token(ctx),
        Problem::MalformedNumber => handler.malformed_number(ctx),
        Problem::MalformedString => handler.malformed_string(ctx),
        Problem::MissingProperty => Resolution::Fail,
    }
}

/// Skip unknown properties with a warning; fail on malformed values.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn unknown_property(&self, ctx: &ErrorContext) -> Resolution {
        // Only the kind: a misplaced secret can show up here.
        tracing::warn!(
            path = %ctx.path,
            source = ctx.source_label(),
            found = ctx.raw_kind(),
            "ignoring unknown property"
        );
        Resolution::UseDefault
    }

    fn unexpected_token(&self, ctx: &ErrorContext) -> Resolution {
        tracing::error!(
            path = %ctx.path,
            source = ctx.source_label(),
            found = ctx.raw_kind(),
            "{}",
            ctx.message
        );
        Resolution::Fail
    }

    fn malformed_number(&self, ctx: &ErrorContext) -> Resolution {
        tracing::error!(path = %ctx.path, source = ctx.source_label(), "malformed number");
        Resolution::Fail
    }

    fn malformed_string(&self, ctx: &ErrorContext) -> Resolution {
        tracing::error!(path = %ctx.path, source = ctx.source_label(), "malformed string");
        Resolution::Fail
    }
}

/// Drop every problem node and carry on with defaults.
#[derive(Debug, Default, Clone, Copy)]
pub struct LenientErrorHandler;

impl ErrorHandler for LenientErrorHandler {
    fn unknown_property(&self, ctx: &ErrorContext) -> Resolution {
        tracing::debug!(path = %ctx.path, "ignoring unknown property");
        Resolution::UseDefault
    }

    fn unexpected_token(&self, ctx: &ErrorContext) -> Resolution {
        tracing::warn!(path = %ctx.path, found = ctx.raw_kind(), "ignoring value of unexpected type");
        Resolution::UseDefault
    }

    fn malformed_number(&self, ctx: &ErrorContext) -> Resolution {
        tracing::warn!(path = %ctx.path, "ignoring malformed number");
        Resolution::UseDefault
    }

    fn malformed_string(&self, ctx: &ErrorContext) -> Resolution {
        tracing::warn!(path = %ctx.path, "ignoring malformed string");
        Resolution::UseDefault
    }
}

/// Fail on everything, unknown properties included.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictErrorHandler;

impl ErrorHandler for StrictErrorHandler {
    fn unknown_property(&self, _ctx: &ErrorContext) -> Resolution {
        Resolution::Fail
    }

    fn unexpected_token(&self, _ctx: &ErrorContext) -> Resolution {
        Resolution::Fail
    }

    fn malformed_number(&self, _ctx: &ErrorContext) -> Resolution {
        Resolution::Fail
    }

    fn malformed_string(&self, _ctx: &ErrorContext) -> Resolution {
        Resolution::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(problem: Problem) -> ErrorContext {
        ErrorContext {
            path: FieldPath::parse("server.port"),
            raw: Some(RawTree::string("eighty")),
            problem,
            message: "invalid digit found in string".into(),
            source: Some("Environment (APP_)".into()),
        }
    }

    #[test]
    fn default_policy_skips_unknown_and_fails_malformed() {
        let handler = DefaultErrorHandler;
        assert_eq!(decide(&handler, &ctx(Problem::UnknownProperty)), Resolution::UseDefault);
        assert_eq!(decide(&handler, &ctx(Problem::MalformedNumber)), Resolution::Fail);
        assert_eq!(decide(&handler, &ctx(Problem::MalformedString)), Resolution::Fail);
        assert_eq!(decide(&handler, &ctx(Problem::TypeMismatch)), Resolution::Fail);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn unknown_property_log_omits_the_value() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt().with_writer(captured.clone()).with_ansi(false).finish();
        let mut leaked = ctx(Problem::UnknownProperty);
        leaked.raw = Some(RawTree::string("hunter2"));

        let resolution = tracing::subscriber::with_default(subscriber, || decide(&DefaultErrorHandler, &leaked));
        assert_eq!(resolution, Resolution::UseDefault);

        let output = String::from_utf8(captured.0.lock().expect("lock").clone()).expect("utf8");
        assert!(output.contains("ignoring unknown property"), "{output}");
        assert!(output.contains("found=") && output.contains("string"), "{output}");
        assert!(!output.contains("hunter2"), "{output}");
    }

    #[test]
    fn missing_property_never_reaches_handler() {
        struct Panicking;
        impl ErrorHandler for Panicking {
            fn unknown_property(&self, _: &ErrorContext) -> Resolution {
                unreachable!()
            }
            fn unexpected_token(&self, _: &ErrorContext) -> Resolution {
                unreachable!()
            }
            fn malformed_number(&self, _: &ErrorContext) -> Resolution {
                unreachable!()
            }
            fn malformed_string(&self, _: &ErrorContext) -> Resolution {
                unreachable!()
            }
        }
        assert_eq!(decide(&Panicking, &ctx(Problem::MissingProperty)), Resolution::Fail);
        assert_eq!(decide(&LenientErrorHandler, &ctx(Problem::MissingProperty)), Resolution::Fail);
    }

    #[test]
    fn lenient_and_strict_are_uniform() {
        for problem in [
            Problem::UnknownProperty,
            Problem::TypeMismatch,
            Problem::MalformedNumber,
            Problem::MalformedString,
        ] {
            assert_eq!(decide(&LenientErrorHandler, &ctx(problem)), Resolution::UseDefault);
            assert_eq!(decide(&StrictErrorHandler, &ctx(problem)), Resolution::Fail);
        }
    }
}
