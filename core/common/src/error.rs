//! Common error types for treemirror.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Top-level error type for treemirror operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed without a known path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem operation on a specific path failed.
    #[error("I/O error at {}: {source}", path.display())]
    Fs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tree root exists but is not a directory.
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The audit log could not be written.
    #[error("Audit log error: {0}")]
    AuditLog(String),

    /// The scheduler could not drive a pass.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// The pass was stopped by a cancellation request.
    #[error("Synchronization cancelled")]
    Cancelled,
}

impl Error {
    /// Wrap an I/O error with the path it occurred on.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Fs {
            path: path.into(),
            source,
        }
    }

    /// Whether this error only signals cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Attach a path to `std::io::Result` values.
pub trait IoContext<T> {
    fn at_path(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at_path(self, path: &Path) -> Result<T> {
        self.map_err(|source| Error::fs(path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_fs_error_mentions_path() {
        let err = Error::fs(
            "/replica/a.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/replica/a.txt"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_at_path() {
        let result: io::Result<()> = Err(io::Error::from(io::ErrorKind::NotFound));
        let err = result.at_path(Path::new("/missing")).unwrap_err();
        assert!(matches!(err, Error::Fs { ref path, .. } if path == Path::new("/missing")));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::InvalidInput("x".to_string()).is_cancelled());
    }
}
