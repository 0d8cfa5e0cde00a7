//! Error taxonomy shared across hartcap, and configuration store errors.

use std::fmt;
use std::path::PathBuf;

use crate::records::ObjectKind;

/// Coarse failure classes every hartcap error maps onto.
///
/// Callers branch on the kind rather than on concrete variants; only the two
/// optional discovery steps ever treat [`ErrorKind::NotFound`] as recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range encoding, length overflow.
    InvalidParameter,
    /// A required node, record or reference target is missing.
    NotFound,
    /// Node present but of an unrecognized sub-type.
    Unsupported,
    /// Internal consistency violation.
    Aborted,
    /// Storage could not be reserved.
    OutOfResources,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidParameter => "invalid parameter",
            ErrorKind::NotFound => "not found",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Aborted => "aborted",
            ErrorKind::OutOfResources => "out of resources",
        };
        f.write_str(name)
    }
}

/// Errors raised by the record store and the platform configuration layer.
#[derive(Debug, thiserror::Error)]
pub enum CmError {
    /// No record of the requested kind was published.
    #[error("no {kind} record available")]
    NotFound {
        /// Kind that was fetched.
        kind: ObjectKind,
    },

    /// More records of a kind than the consumer accepts.
    #[error("expected at most {max} {kind} record(s), found {found}")]
    TooMany {
        /// Kind that was fetched.
        kind: ObjectKind,
        /// Most records the consumer accepts.
        max: usize,
        /// Records actually stored.
        found: usize,
    },

    /// Storage for published records could not be reserved.
    #[error("could not reserve storage for {count} {kind} record(s)")]
    OutOfResources {
        /// Kind being stored.
        kind: ObjectKind,
        /// Number of records requested.
        count: usize,
    },

    /// A platform file is not valid TOML for the expected schema.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A platform config could not be rendered as TOML.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Reading a platform file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The platform file path does not exist.
    #[error("platform file not found: {}", path.display())]
    FileNotFound {
        /// Path that was opened.
        path: PathBuf,
    },

    /// A platform value is out of range or inconsistent.
    #[error("validation error: {detail}")]
    Validation {
        /// What was wrong.
        detail: String,
    },
}

impl CmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CmError::NotFound { .. } | CmError::FileNotFound { .. } => ErrorKind::NotFound,
            CmError::OutOfResources { .. } => ErrorKind::OutOfResources,
            CmError::TooMany { .. }
            | CmError::Toml(_)
            | CmError::TomlSer(_)
            | CmError::Validation { .. } => ErrorKind::InvalidParameter,
            CmError::Io(_) => ErrorKind::Aborted,
        }
    }
}

/// Result type for configuration store operations.
pub type Result<T> = std::result::Result<T, CmError>;
