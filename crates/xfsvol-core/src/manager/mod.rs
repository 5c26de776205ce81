//! Volume lifecycle on top of the quota controller.
//!
//! A volume is a directory directly under the root with its own project
//! quota. The directory tree and the kernel's project bindings are the only
//! persisted state; the manager keeps nothing on disk of its own.
//!
//! ## Policies
//!
//! - **Create is not idempotent**: creating over an existing directory fails
//!   with [`VolumeError::AlreadyExists`] and leaves that directory's quota
//!   alone.
//! - **Create cleans up after itself**: if the quota cannot be applied, the
//!   directory it just made is removed again before the error is returned.
//! - **Project ids are not recycled**: a deleted volume's id is retired.

mod error;
mod volume;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::quota::backends::XfsBackend;
use crate::quota::{ControlConfig, Quota, QuotaController, QuotaOps};

pub use error::{VolumeError, VolumeResult};
pub use volume::{Volume, validate_name};

/// Configuration for a [`VolumeManager`].
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    /// Directory holding the volumes, on an XFS filesystem mounted with
    /// `pquota`.
    pub root: PathBuf,

    /// Floor for project id allocation.
    pub starting_project_id: Option<u32>,
}

impl ManagerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            starting_project_id: None,
        }
    }
}

/// Creates, lists, inspects and deletes quota-backed volumes.
///
/// Not synchronized; see the crate docs.
#[derive(Debug)]
pub struct VolumeManager {
    root: PathBuf,
    control: QuotaController,
}

impl VolumeManager {
    /// Open the root with the kernel XFS backend.
    pub fn new(config: ManagerConfig) -> VolumeResult<Self> {
        Self::with_backend(config, Arc::new(XfsBackend::new()))
    }

    /// Open the root with any quota backend.
    pub fn with_backend(config: ManagerConfig, backend: Arc<dyn QuotaOps>) -> VolumeResult<Self> {
        let control_config = ControlConfig {
            base_path: config.root.clone(),
            starting_project_id: config.starting_project_id,
        };

        let control = QuotaController::new(control_config, backend).map_err(|e| {
            VolumeError::control(
                format!(
                    "couldn't initialize quota control under root {}",
                    config.root.display()
                ),
                e,
            )
        })?;

        Ok(Self {
            root: control.base_path().to_path_buf(),
            control,
        })
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The underlying quota controller.
    pub fn controller(&self) -> &QuotaController {
        &self.control
    }

    /// Create volume `name` with a byte limit and an optional inode limit
    /// (`None` = unlimited). Returns the volume's absolute path.
    #[tracing::instrument(skip(self), name = "volume.create")]
    pub fn create(&mut self, name: &str, size: u64, inodes: Option<u64>) -> VolumeResult<PathBuf> {
        validate_name(name)?;
        let path = self.root.join(name);

        fs::create_dir(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                VolumeError::AlreadyExists(name.to_string())
            } else {
                VolumeError::io(format!("couldn't create directory {}", path.display()), e)
            }
        })?;

        let quota = Quota::new(size, inodes.unwrap_or(0));
        if let Err(e) = self.control.set_quota(&path, &quota) {
            self.discard(&path);
            return Err(VolumeError::control(
                format!("couldn't set quota for volume {name}"),
                e,
            ));
        }

        info!(path = %path.display(), size, inodes = quota.inodes, "volume created");
        Ok(path)
    }

    /// All volumes under the root, in directory listing order.
    ///
    /// Entries that are not directories are skipped, and so are directories
    /// with no project id (nothing this manager created or adopted).
    pub fn list(&self) -> VolumeResult<Vec<Volume>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            VolumeError::io(
                format!("couldn't list volumes under root {}", self.root.display()),
                e,
            )
        })?;

        let mut volumes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                VolumeError::io(format!("couldn't read entry under {}", self.root.display()), e)
            })?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }

            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "skipping directory with non UTF-8 name");
                continue;
            };

            let path = entry.path();
            if self.control.project_id(&path).is_none() {
                warn!(path = %path.display(), "skipping directory without a project id");
                continue;
            }

            volumes.push(self.load(name, path)?);
        }

        Ok(volumes)
    }

    /// Look up one volume; `None` if there is no such directory or it has
    /// no project id. The quota is read live from the kernel.
    pub fn get(&self, name: &str) -> VolumeResult<Option<Volume>> {
        validate_name(name)?;
        let path = self.root.join(name);

        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VolumeError::io(
                    format!("couldn't stat {}", path.display()),
                    e,
                ));
            }
        }

        if self.control.project_id(&path).is_none() {
            return Ok(None);
        }

        self.load(name.to_string(), path).map(Some)
    }

    /// Remove volume `name` and everything in it.
    ///
    /// The volume's project id is retired, not recycled.
    #[tracing::instrument(skip(self), name = "volume.delete")]
    pub fn delete(&mut self, name: &str) -> VolumeResult<()> {
        validate_name(name)?;
        let path = self.root.join(name);

        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(VolumeError::NotFound(name.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VolumeError::NotFound(name.to_string()));
            }
            Err(e) => {
                return Err(VolumeError::io(
                    format!("couldn't stat {}", path.display()),
                    e,
                ));
            }
        }

        fs::remove_dir_all(&path).map_err(|e| {
            VolumeError::io(format!("couldn't remove directory {}", path.display()), e)
        })?;

        let retired = self.control.forget(&path);
        info!(
            path = %path.display(),
            project_id = ?retired.map(|id| id.get()),
            "volume deleted"
        );
        Ok(())
    }

    fn load(&self, name: String, path: PathBuf) -> VolumeResult<Volume> {
        let quota = self.control.get_quota(&path).map_err(|e| {
            VolumeError::control(format!("couldn't retrieve quota of volume {name}"), e)
        })?;

        Ok(Volume {
            name,
            path,
            size: quota.size,
            inodes: quota.inodes,
        })
    }

    /// Undo a create whose quota step failed.
    fn discard(&mut self, path: &Path) {
        self.control.forget(path);
        if let Err(e) = fs::remove_dir(path) {
            warn!(path = %path.display(), error = %e, "couldn't remove directory of failed volume");
        }
    }
}
