use std::path::PathBuf;

use thiserror::Error;

/// Possible errors that could happen while constructing or running a `Tailer`
///
/// Only `Configuration` is ever returned to the caller. The other variants are handed to
/// `TailerListener::on_error` while the run loop keeps polling.
#[derive(Error, Debug)]
pub enum TailerError {
    #[error("invalid tailer configuration: {0}")]
    Configuration(String),

    #[error("while opening {}", path.display())]
    FileUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("while reading from underlying file")]
    Io(#[from] std::io::Error),
}

impl TailerError {
    /// Whether error means that file is gone rather than temporarily unreadable
    pub fn is_not_found(&self) -> bool {
        let io_error = match self {
            TailerError::Configuration(_) => return false,
            TailerError::FileUnavailable { source, .. } => source,
            TailerError::Io(e) => e,
        };
        io_error.kind() == std::io::ErrorKind::NotFound
    }
}
