//! Volume type and name rules.

use std::path::PathBuf;

use super::error::{VolumeError, VolumeResult};
use crate::quota::CONTROL_DEVICE_NAME;

/// A quota-backed directory directly under the manager's root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    /// Base name of the directory; the volume's identity.
    pub name: String,
    /// `root/name`, absolute.
    pub path: PathBuf,
    /// Hard limit on bytes (0 = unlimited).
    pub size: u64,
    /// Hard limit on inodes (0 = unlimited).
    pub inodes: u64,
}

/// Reject names that are empty, reserved, or not a single path component.
pub fn validate_name(name: &str) -> VolumeResult<()> {
    if name.is_empty() {
        return Err(VolumeError::invalid_name(name, "name must not be empty"));
    }
    if name == "." || name == ".." {
        return Err(VolumeError::invalid_name(name, "name must not be a relative path component"));
    }
    if name.contains('/') {
        return Err(VolumeError::invalid_name(name, "name must not contain a path separator"));
    }
    if name.contains('\0') {
        return Err(VolumeError::invalid_name(name, "name must not contain a NUL byte"));
    }
    if name == CONTROL_DEVICE_NAME {
        return Err(VolumeError::invalid_name(name, "name is reserved for the quota control device"));
    }
    Ok(())
}
