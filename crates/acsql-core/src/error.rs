use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured engine error with a stable internal classification.
/// Not a stable API; the facade maps it onto the public taxonomy.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a parse-origin syntax error carrying the failing byte offset.
    pub(crate) fn syntax(position: usize, message: impl fmt::Display) -> Self {
        Self::new(
            ErrorClass::Syntax,
            ErrorOrigin::Parse,
            format!("{message} at position {position}"),
        )
    }

    /// Construct a normalization failure (wrong arity, malformed operands).
    /// Well-formed filters never reach it, so it counts as an engine fault.
    pub(crate) fn normalize(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Normalize, message)
    }

    pub(crate) fn unsupported(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, origin, message)
    }

    pub(crate) fn invalid_query(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvalidQuery, origin, message)
    }

    /// Construct a store-origin access denial for a restricted field.
    pub(crate) fn access_denied(collection: impl fmt::Display, field: &str) -> Self {
        Self::new(
            ErrorClass::AccessDenied,
            ErrorOrigin::Store,
            format!("access to field '{field}' of collection '{collection}' is denied"),
        )
    }

    /// Construct a synth-origin invariant violation.
    pub(crate) fn synth_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Synth, message)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Syntax,
    Unsupported,
    InvalidQuery,
    AccessDenied,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Syntax => "syntax",
            Self::Unsupported => "unsupported",
            Self::InvalidQuery => "invalid_query",
            Self::AccessDenied => "access_denied",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Parse,
    Normalize,
    Synth,
    Store,
    Paginate,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Parse => "parse",
            Self::Normalize => "normalize",
            Self::Synth => "synth",
            Self::Store => "store",
            Self::Paginate => "paginate",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
