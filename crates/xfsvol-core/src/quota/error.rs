//! Quota control error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::error::ErrorKind;

/// Quota control error type.
#[derive(Debug, Error)]
pub enum QuotaError {
    /// Missing or unusable base path.
    #[error("invalid quota control configuration: {0}")]
    Config(String),

    /// Path has no project id in the cache.
    #[error("no project id associated with path {}", .0.display())]
    NotFound(PathBuf),

    /// Filesystem operation failed (scan, device creation, project id bind).
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Kernel quota call failed, or project quotas are not enforced.
    #[error("{context}")]
    Quota {
        context: String,
        #[source]
        source: Option<io::Error>,
    },
}

impl QuotaError {
    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an Io error.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a Quota error wrapping a failed kernel call.
    pub fn quota(context: impl Into<String>, source: io::Error) -> Self {
        Self::Quota {
            context: context.into(),
            source: Some(source),
        }
    }

    /// Create a Quota error with no underlying call failure.
    pub fn unsupported(context: impl Into<String>) -> Self {
        Self::Quota {
            context: context.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QuotaError::Config(_) => ErrorKind::Config,
            QuotaError::NotFound(_) => ErrorKind::NotFound,
            QuotaError::Io { .. } => ErrorKind::Io,
            QuotaError::Quota { .. } => ErrorKind::Quota,
        }
    }
}

/// Quota control result type.
pub type QuotaResult<T> = Result<T, QuotaError>;
