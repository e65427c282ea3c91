//! Typed errors for the copy pipeline.
//!
//! The staging and transform layers return these so callers can tell a
//! missing transformer registration apart from a broken input document.
//! Orchestration code above them wraps everything in `anyhow` with context.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no transformer registered for {source_ext} => {dest_ext}")]
    TransformerNotFound {
        source_ext: String,
        dest_ext: String,
    },

    #[error("malformed notebook {}: {reason}", .path.display())]
    NotebookParse { path: PathBuf, reason: String },

    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// True for the registry miss raised by `TransformerRegistry::lookup`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::TransformerNotFound { .. })
    }
}
