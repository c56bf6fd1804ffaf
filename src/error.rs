//! Error kinds produced by the storage core.
//!
//! A single enum covering every failure kind, with hand-written
//! `Display`/`std::error::Error` impls rather than pulling in `thiserror`.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Malformed key, an entry exceeding tupleSize, or a delete of a
    /// non-existent key.
    BadArgument(String),
    /// Insert would produce two equal entries under the unique Compare.
    UniquenessViolation(String),
    /// Insert of NULL into a NOT NULL key field.
    NullabilityViolation(String),
    /// Integrity check found an inconsistency and the host's treatment flag
    /// forbids continuing.
    VerifyAborted(String),
    /// Cooperative cancellation observed.
    Cancel,
    /// Unrecognized type, field count, or fix-mode combination.
    NotSupported(String),
    FileNotFound(String),
    LogItemCorrupted(String),
    TooLongObjectName(String),
    MetaDatabaseCorrupted(String),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadArgument(s) => write!(f, "bad argument: {}", s),
            Error::UniquenessViolation(s) => {
                write!(f, "uniqueness violation: {}", s)
            }
            Error::NullabilityViolation(s) => {
                write!(f, "nullability violation: {}", s)
            }
            Error::VerifyAborted(s) => write!(f, "verify aborted: {}", s),
            Error::Cancel => write!(f, "operation canceled"),
            Error::NotSupported(s) => write!(f, "not supported: {}", s),
            Error::FileNotFound(s) => write!(f, "file not found: {}", s),
            Error::LogItemCorrupted(s) => {
                write!(f, "log item corrupted: {}", s)
            }
            Error::TooLongObjectName(s) => {
                write!(f, "object name too long: {}", s)
            }
            Error::MetaDatabaseCorrupted(s) => {
                write!(f, "meta database corrupted: {}", s)
            }
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
