use acsql_core::error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    /// Configuration could not be read or decoded.
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, ErrorOrigin::Config, message)
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match err.class {
            ErrorClass::Syntax => ErrorKind::Syntax,
            ErrorClass::Unsupported => ErrorKind::UnsupportedOperator,
            ErrorClass::InvalidQuery => ErrorKind::InvalidQuery,
            ErrorClass::AccessDenied => ErrorKind::AccessDenied,
            ErrorClass::InvariantViolation => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

///
/// ErrorKind
/// Public error taxonomy. No kind is retryable.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Filter text does not parse.
    Syntax,

    /// Operator or operand shape the target cannot express.
    UnsupportedOperator,

    /// Well-formed filter with a semantic error.
    InvalidQuery,

    /// Filter reads a restricted field.
    AccessDenied,

    /// Configuration is malformed.
    Config,

    /// The caller cannot remediate this.
    Internal,
}

///
/// ErrorOrigin
/// Public origin taxonomy.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Parse,
    Normalize,
    Synth,
    Store,
    Paginate,
    Config,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Parse => Self::Parse,
            CoreErrorOrigin::Normalize => Self::Normalize,
            CoreErrorOrigin::Synth => Self::Synth,
            CoreErrorOrigin::Store => Self::Store,
            CoreErrorOrigin::Paginate => Self::Paginate,
            CoreErrorOrigin::Config => Self::Config,
        }
    }
}
