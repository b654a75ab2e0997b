use std::path::PathBuf;

/// Errors raised by cache backends.
///
/// Readers never surface these to the marker pipeline: a failed read is
/// logged and reported as a miss.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("cache I/O failed at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupted cache entry {path}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cache entry {path} was written for fingerprint {found}")]
    KeyMismatch { path: PathBuf, found: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
