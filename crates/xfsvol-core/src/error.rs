//! Error classification shared by every layer.

use std::fmt;

/// Broad category of a failure.
///
/// Each error type in the crate maps onto one of these via `kind()`, so
/// callers (and tests) can branch on what went wrong without matching on
/// every wrapped variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid configuration (empty root, root not a directory).
    Config,
    /// Malformed volume name.
    Validation,
    /// Create over an existing volume.
    Conflict,
    /// Operation on an unknown path or volume.
    NotFound,
    /// Malformed size string.
    Parse,
    /// Filesystem operation failure (mkdir, rmdir, project id bind, scan).
    Io,
    /// Kernel quota call failure, including missing project quota support.
    Quota,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "config",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not found",
            ErrorKind::Parse => "parse",
            ErrorKind::Io => "io",
            ErrorKind::Quota => "quota",
        };
        f.write_str(s)
    }
}
