//! Error taxonomy for the grouping engine.
//!
//! Every failure surfaced by the engine is one of three classes:
//!
//! - [`Error::NotFound`]: an update/delete matched zero rows, or a lookup
//!   missed. Maps to a 404-equivalent.
//! - [`Error::Validation`]: a required field or filter is missing, or an enum
//!   value is unknown. Raised before any storage call. Maps to a
//!   400-equivalent.
//! - [`Error::Storage`]: connection, constraint, or transaction failure.
//!   Maps to a 500-equivalent. A row that cannot be decoded into its model
//!   type is reported as `InternalUnexpected`.
//! - [`Error::Config`]: the config file is not valid TOML for the engine
//!   config. Maps to a 500-equivalent.
//!
//! No operation retries internally; retry policy belongs to the caller.

use std::fmt;
use std::path::PathBuf;

use crate::model::EventKind;

/// Result alias used by every engine operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Machine-readable error codes for callers that branch on failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    StoreUnavailable,
    ConfigParseError,
    GroupNotFound,
    EventNotFound,
    MissingField,
    InvalidEnumValue,
    InvalidFilter,
    StorageFailure,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::StoreUnavailable => "E1001",
            Self::ConfigParseError => "E1002",
            Self::GroupNotFound => "E2001",
            Self::EventNotFound => "E2002",
            Self::MissingField => "E3001",
            Self::InvalidEnumValue => "E3002",
            Self::InvalidFilter => "E3003",
            Self::StorageFailure => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::StoreUnavailable => "Event store unavailable",
            Self::ConfigParseError => "Config file parse error",
            Self::GroupNotFound => "Group not found",
            Self::EventNotFound => "Event not found",
            Self::MissingField => "Required field missing",
            Self::InvalidEnumValue => "Invalid status/level/sort value",
            Self::InvalidFilter => "Invalid filter",
            Self::StorageFailure => "Storage failure",
            Self::LockContention => "Store is busy",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::StoreUnavailable => Some("Check the store path and its directory permissions."),
            Self::ConfigParseError => Some("Fix syntax in duckbug config.toml and retry."),
            Self::GroupNotFound | Self::EventNotFound => None,
            Self::MissingField => Some("Supply projectId and fingerprint on every event."),
            Self::InvalidEnumValue => Some(
                "Status is unresolved|resolved|ignored, level is DEBUG|INFO|WARN|ERROR, sort is asc|desc.",
            ),
            Self::InvalidFilter => Some("Check that time ranges are ordered and ids are non-empty."),
            Self::StorageFailure => Some("Retry the whole call. If persistent, inspect the store."),
            Self::LockContention => Some("Retry after concurrent writers release the store."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Which kind of row a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Group,
    Event,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group => f.write_str("group"),
            Self::Event => f.write_str("event"),
        }
    }
}

/// Errors returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Zero rows matched an update/delete, or a lookup missed.
    #[error("{kind} {record} not found: {id}")]
    NotFound {
        kind: EventKind,
        record: Record,
        /// The id that was requested (comma-joined for batch calls).
        id: String,
    },

    /// Input rejected before touching storage.
    #[error("invalid input: {message}")]
    Validation { code: ErrorCode, message: String },

    /// The store failed while executing `op`.
    #[error("storage failure during {op}: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// The config file at `path` could not be parsed.
    #[error("invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl Error {
    /// A missing or empty required field.
    #[must_use]
    pub fn missing(field: &str) -> Self {
        Self::Validation {
            code: ErrorCode::MissingField,
            message: format!("{field} is required"),
        }
    }

    /// A filter combination that cannot be satisfied.
    #[must_use]
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::InvalidFilter,
            message: message.into(),
        }
    }

    /// Machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound {
                record: Record::Group,
                ..
            } => ErrorCode::GroupNotFound,
            Self::NotFound {
                record: Record::Event,
                ..
            } => ErrorCode::EventNotFound,
            Self::Validation { code, .. } => *code,
            Self::Storage { source, .. } => storage_code(source),
            Self::Config { .. } => ErrorCode::ConfigParseError,
        }
    }

    /// HTTP-equivalent status class for outer layers.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation { .. } => 400,
            Self::Storage { .. } | Self::Config { .. } => 500,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn storage_code(source: &rusqlite::Error) -> ErrorCode {
    match source {
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => ErrorCode::InternalUnexpected,
        _ => match source.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                ErrorCode::LockContention
            }
            Some(rusqlite::ErrorCode::CannotOpen) => ErrorCode::StoreUnavailable,
            _ => ErrorCode::StorageFailure,
        },
    }
}

/// Build a `map_err` adapter that tags a rusqlite error with the operation
/// that produced it.
pub(crate) fn storage(op: &'static str) -> impl FnOnce(rusqlite::Error) -> Error {
    move |source| Error::Storage { op, source }
}

/// Error returned when parsing an unknown status, level, kind or sort value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    /// What was being parsed (`status`, `level`, ...).
    pub field: &'static str,
    /// The unrecognised input string.
    pub raw: String,
    /// Human-readable list of accepted values.
    pub expected: &'static str,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown {} '{}': expected one of {}",
            self.field, self.raw, self.expected
        )
    }
}

impl std::error::Error for UnknownVariant {}

impl From<UnknownVariant> for Error {
    fn from(err: UnknownVariant) -> Self {
        Self::Validation {
            code: ErrorCode::InvalidEnumValue,
            message: err.to_string(),
        }
    }
}
