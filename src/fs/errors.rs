//! Resolution Error Types
//!
//! Structured error handling for path validation and filesystem resolution.
//! Maps each failure to the single status code reported to the client.

use std::io;
use std::path::PathBuf;

/// Errors raised while turning a request path into a servable resource
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Forbidden: {}", .0.display())]
    Forbidden(PathBuf),

    #[error("File too large: {} ({size} bytes)", .path.display())]
    TooLarge { path: PathBuf, size: u64 },

    #[error("Cannot list directory {}: {source}", .path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Build an `InvalidPath` error from raw request bytes
    pub fn invalid_path(path: &[u8], reason: impl Into<String>) -> Self {
        FsError::InvalidPath {
            path: String::from_utf8_lossy(path).into_owned(),
            reason: reason.into(),
        }
    }

    /// Classify an I/O error raised while opening or stat-ing `path`
    pub fn from_io(path: PathBuf, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path),
            io::ErrorKind::PermissionDenied => FsError::Forbidden(path),
            _ => FsError::Io { path, source: err },
        }
    }

    /// HTTP-style status code reported to the client
    ///
    /// Only malformed paths are a client error; everything else reads as
    /// not-found so internal layout and I/O detail stay private.
    pub fn status_code(&self) -> u16 {
        match self {
            FsError::InvalidPath { .. } => 400,
            FsError::NotFound(_)
            | FsError::Forbidden(_)
            | FsError::TooLarge { .. }
            | FsError::Listing { .. }
            | FsError::Io { .. } => 404,
        }
    }

    /// Response body reported to the client
    pub fn client_message(&self) -> &'static str {
        match self {
            FsError::InvalidPath { .. } => "Invalid request path",
            FsError::Listing { .. } => "Cannot create directory index",
            _ => "Cannot open requested path",
        }
    }

    /// Whether the target simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let path = PathBuf::from("x");
        let err = FsError::from_io(path.clone(), io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());

        let err = FsError::from_io(path.clone(), io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, FsError::Forbidden(_)));

        let err = FsError::from_io(path, io::Error::from(io::ErrorKind::Interrupted));
        assert!(matches!(err, FsError::Io { .. }));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(FsError::invalid_path(b"a\0b", "nul byte").status_code(), 400);
        assert_eq!(FsError::NotFound(PathBuf::from("x")).status_code(), 404);
        assert_eq!(FsError::Forbidden(PathBuf::from("x")).status_code(), 404);
        assert_eq!(
            FsError::TooLarge {
                path: PathBuf::from("x"),
                size: u64::MAX
            }
            .status_code(),
            404
        );
    }

    #[test]
    fn test_client_message_hides_detail() {
        let err = FsError::Io {
            path: PathBuf::from("/srv/secret/file"),
            source: io::Error::new(io::ErrorKind::Other, "disk on fire"),
        };
        assert!(!err.client_message().contains("secret"));
        assert!(!err.client_message().contains("fire"));
    }
}
