//! Controller bootstrap: control device creation and the initial scan.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{QuotaError, QuotaResult};
use super::ops::QuotaOps;
use super::types::ProjectId;

/// Name of the control device created directly under the base path.
///
/// Reserved: no volume may use it.
pub const CONTROL_DEVICE_NAME: &str = "__control-device";

/// Create (or reuse) the control device under `base_path`.
pub(crate) fn create_backing_device(
    backend: &dyn QuotaOps,
    base_path: &Path,
) -> QuotaResult<PathBuf> {
    backend
        .create_control_device(base_path, CONTROL_DEVICE_NAME)
        .map_err(|e| {
            QuotaError::io(
                format!(
                    "failed to create backing fs device for base path {}",
                    base_path.display()
                ),
                e,
            )
        })
}

/// Fail unless the filesystem behind `device` accounts and enforces project
/// quotas.
pub(crate) fn ensure_project_quota(backend: &dyn QuotaOps, device: &Path) -> QuotaResult<()> {
    let enabled = backend.project_quota_enabled(device).map_err(|e| {
        QuotaError::quota(
            format!("failed to query quota state through {}", device.display()),
            e,
        )
    })?;

    if !enabled {
        return Err(QuotaError::unsupported(format!(
            "filesystem behind {} does not enforce project quotas (mount with pquota)",
            device.display()
        )));
    }
    Ok(())
}

/// Map each directory directly under `root` to its on-disk project id.
///
/// Directories without a project (id 0) are left out. Symlinks are not
/// followed.
pub(crate) fn scan_project_ids(
    backend: &dyn QuotaOps,
    root: &Path,
) -> QuotaResult<HashMap<PathBuf, ProjectId>> {
    let entries = fs::read_dir(root).map_err(|e| {
        QuotaError::io(
            format!(
                "failed to list files and directories under path {}",
                root.display()
            ),
            e,
        )
    })?;

    let mut mapping = HashMap::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            QuotaError::io(format!("failed to read entry under {}", root.display()), e)
        })?;
        let file_type = entry.file_type().map_err(|e| {
            QuotaError::io(
                format!("failed to stat {}", entry.path().display()),
                e,
            )
        })?;
        if !file_type.is_dir() {
            continue;
        }

        let path = entry.path();
        let project_id = backend.get_project_id(&path).map_err(|e| {
            QuotaError::io(
                format!("failed to retrieve project id for directory {}", path.display()),
                e,
            )
        })?;

        if !project_id.is_none() {
            mapping.insert(path, project_id);
        }
    }

    Ok(mapping)
}
