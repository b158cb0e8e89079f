//src/error.rs

use std::io;

use thiserror::Error;

/// Errors raised by the document model.
///
/// Malformed lines inside forgiving readers are logged and skipped instead of
/// being reported here; only structural problems and I/O failures surface.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to read {what}: {source}")]
    Read {
        what: String,
        #[source]
        source: io::Error,
    },

    #[error("unknown sample: {0}")]
    UnknownSample(String),

    #[error("sample already exists: {0}")]
    DuplicateSample(String),

    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("attribute already exists: {0}")]
    DuplicateAttribute(String),

    #[error("unrecognized file format: {0}")]
    UnknownFormat(String),

    #[error("files of type '{0}' are not supported")]
    UnsupportedFormat(String),

    #[error("invalid edit: {0}")]
    InvalidEdit(String),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Wraps an I/O error as a read failure of `what`.
    pub fn read(what: impl Into<String>, source: io::Error) -> Self {
        Error::Read {
            what: what.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
