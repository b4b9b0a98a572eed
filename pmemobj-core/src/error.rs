//! Error types for pool operations.
//!
//! Every fallible operation returns [`PoolError`]. Variants carry the path,
//! offset or sizes involved so a failure can be diagnosed from its message
//! alone.

use crate::types::Oid;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The main error type for pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    // =========================================================================
    // Lifecycle Errors (E001-E099)
    // =========================================================================
    /// The pool file already exists.
    #[error("E001: Pool file already exists at {path}")]
    AlreadyExists {
        /// Path that was asked to be created.
        path: PathBuf,
    },

    /// The pool file does not exist.
    #[error("E002: Pool file not found at {path}")]
    NotFound {
        /// Path that was asked to be opened.
        path: PathBuf,
    },

    /// Requested pool size is below the minimum viable size.
    #[error("E003: Pool size {size} bytes is below the minimum of {minimum} bytes")]
    TooSmall {
        /// Requested size.
        size: u64,
        /// Minimum accepted size.
        minimum: u64,
    },

    /// The OS refused access to the pool file.
    #[error("E004: Permission denied for pool at {path}")]
    PermissionDenied {
        /// Path of the pool file.
        path: PathBuf,
    },

    /// Another handle holds the pool file lock.
    #[error("E005: Pool at {path} is locked by another handle")]
    Locked {
        /// Path of the pool file.
        path: PathBuf,
    },

    /// The layout tag cannot be stored in the superblock.
    #[error("E006: Invalid layout tag '{layout}': {cause}")]
    InvalidLayout {
        /// The rejected layout tag.
        layout: String,
        /// Why it was rejected.
        cause: String,
    },

    /// The stored layout tag differs from the requested one.
    #[error("E007: Layout mismatch: expected '{expected}', pool has '{found}'")]
    LayoutMismatch {
        /// Layout the caller asked for.
        expected: String,
        /// Layout recorded in the pool.
        found: String,
    },

    /// Structural validation of the pool failed.
    #[error("E008: Pool corruption detected at offset 0x{offset:08x}: {cause}")]
    CorruptPool {
        /// Offset where the problem was found.
        offset: u64,
        /// Description of the corruption.
        cause: String,
    },

    /// The pool handle was closed.
    #[error("E009: Pool is closed")]
    PoolClosed,

    // =========================================================================
    // Allocation Errors (E100-E199)
    // =========================================================================
    /// No free extent is large enough for the request.
    #[error("E101: Out of pool space: requested {requested} bytes, largest free extent {available} bytes")]
    OutOfSpace {
        /// Bytes requested, including header and alignment.
        requested: u64,
        /// Largest contiguous free extent.
        available: u64,
    },

    // =========================================================================
    // Object Access Errors (E200-E299)
    // =========================================================================
    /// The chain is empty, or iteration reached its end.
    #[error("E201: No such object")]
    NoSuchObject,

    /// The object id does not refer to a live object in this pool.
    #[error("E202: Invalid oid {oid}: {cause}")]
    InvalidOid {
        /// The rejected object id.
        oid: Oid,
        /// Why the id was rejected.
        cause: String,
    },

    /// The stored payload size differs from what the caller expects.
    #[error("E203: Payload size mismatch: expected {expected} bytes, stored {found} bytes")]
    SizeMismatch {
        /// Size the caller's payload type expects.
        expected: u64,
        /// Size recorded in the object header.
        found: u64,
    },

    /// Stored bytes are not a valid value of the requested payload type.
    #[error("E204: Invalid payload: {cause}")]
    InvalidPayload {
        /// Why the bytes were rejected.
        cause: String,
    },

    // =========================================================================
    // I/O Errors (E900-E999)
    // =========================================================================
    /// Underlying media or OS failure.
    #[error("E901: I/O error on {path}: {source}")]
    Io {
        /// Path of the pool file, empty for in-memory regions.
        path: PathBuf,
        /// The OS error.
        #[source]
        source: io::Error,
    },
}

impl PoolError {
    /// Get the error code (e.g., "E001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "E001",
            Self::NotFound { .. } => "E002",
            Self::TooSmall { .. } => "E003",
            Self::PermissionDenied { .. } => "E004",
            Self::Locked { .. } => "E005",
            Self::InvalidLayout { .. } => "E006",
            Self::LayoutMismatch { .. } => "E007",
            Self::CorruptPool { .. } => "E008",
            Self::PoolClosed => "E009",
            Self::OutOfSpace { .. } => "E101",
            Self::NoSuchObject => "E201",
            Self::InvalidOid { .. } => "E202",
            Self::SizeMismatch { .. } => "E203",
            Self::InvalidPayload { .. } => "E204",
            Self::Io { .. } => "E901",
        }
    }

    /// Classify an OS error raised while touching `path`.
    pub fn from_io(path: impl AsRef<Path>, err: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match err.kind() {
            io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source: err },
        }
    }

    /// Shorthand for an [`PoolError::InvalidOid`].
    pub(crate) fn invalid_oid(oid: Oid, cause: impl Into<String>) -> Self {
        Self::InvalidOid {
            oid,
            cause: cause.into(),
        }
    }

    /// Shorthand for a [`PoolError::CorruptPool`].
    pub(crate) fn corrupt(offset: u64, cause: impl Into<String>) -> Self {
        Self::CorruptPool {
            offset,
            cause: cause.into(),
        }
    }

    /// Check if this error leaves the pool untouched and the caller may
    /// reasonably try again later (e.g. after freeing objects).
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::OutOfSpace { .. } | Self::Locked { .. })
    }

    /// Check if this error reports a caller mistake rather than pool state.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::PoolClosed
                | Self::InvalidOid { .. }
                | Self::SizeMismatch { .. }
                | Self::InvalidLayout { .. }
                | Self::TooSmall { .. }
        )
    }
}

/// Result type alias using `PoolError`.
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_correct() {
        let err = PoolError::AlreadyExists {
            path: PathBuf::from("/tmp/pool"),
        };
        assert_eq!(err.code(), "E001");
        assert_eq!(PoolError::NoSuchObject.code(), "E201");
        assert_eq!(PoolError::PoolClosed.code(), "E009");
    }

    #[test]
    fn error_display() {
        let err = PoolError::SizeMismatch {
            expected: 8,
            found: 4,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("E203"));
        assert!(msg.contains("expected 8"));
        assert!(msg.contains("stored 4"));

        let err = PoolError::invalid_oid(Oid::new(0x40), "out of bounds");
        let msg = format!("{}", err);
        assert!(msg.contains("0x00000040"));
        assert!(msg.contains("out of bounds"));
    }

    #[test]
    fn io_errors_are_classified() {
        let path = Path::new("/tmp/pool");

        let err = PoolError::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, PoolError::NotFound { .. }));

        let err = PoolError::from_io(path, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, PoolError::PermissionDenied { .. }));

        let err = PoolError::from_io(path, io::Error::from(io::ErrorKind::AlreadyExists));
        assert!(matches!(err, PoolError::AlreadyExists { .. }));

        let err = PoolError::from_io(path, io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, PoolError::Io { .. }));
    }

    #[test]
    fn retriable_and_usage_errors() {
        assert!(
            PoolError::OutOfSpace {
                requested: 64,
                available: 0
            }
            .is_retriable()
        );
        assert!(!PoolError::NoSuchObject.is_retriable());

        assert!(PoolError::PoolClosed.is_usage_error());
        assert!(!PoolError::corrupt(0, "bad magic").is_usage_error());
    }
}
