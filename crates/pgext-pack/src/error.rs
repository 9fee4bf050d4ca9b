//! Error types for the packaging pipeline.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("cannot read manifest {path:?}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot walk installation root: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("symbol dump {program:?} failed with {status}")]
    SymbolDump { program: PathBuf, status: ExitStatus },

    #[error("payload found but no extension name was detected or given")]
    NoExtensionName,

    #[error("archive write failed: {0}")]
    Archive(#[source] io::Error),
}

impl PackError {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

pub type Result<T, E = PackError> = std::result::Result<T, E>;
