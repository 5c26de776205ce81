//! Volume manager error types.

use std::io;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::quota::QuotaError;

/// Volume manager error type.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// Name is empty, reserved, or would escape the root.
    #[error("invalid volume name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A directory with this name already exists.
    #[error("volume {0} already exists")]
    AlreadyExists(String),

    /// No directory with this name.
    #[error("volume {0} not found")]
    NotFound(String),

    /// Directory create, list, or remove failed.
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The quota controller failed; the kind is the controller's.
    #[error("{context}")]
    Control {
        context: String,
        #[source]
        source: QuotaError,
    },
}

impl VolumeError {
    /// Create an InvalidName error.
    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }

    /// Create an Io error.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap a controller error.
    pub fn control(context: impl Into<String>, source: QuotaError) -> Self {
        Self::Control {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            VolumeError::InvalidName { .. } => ErrorKind::Validation,
            VolumeError::AlreadyExists(_) => ErrorKind::Conflict,
            VolumeError::NotFound(_) => ErrorKind::NotFound,
            VolumeError::Io { .. } => ErrorKind::Io,
            VolumeError::Control { source, .. } => source.kind(),
        }
    }
}

/// Volume manager result type.
pub type VolumeResult<T> = Result<T, VolumeError>;
