//! Project id allocation and quota get/set.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::bootstrap;
use super::error::{QuotaError, QuotaResult};
use super::ops::QuotaOps;
use super::types::{ProjectId, Quota, QuotaUsage};

/// Configuration for a [`QuotaController`].
#[derive(Debug, Clone, Default)]
pub struct ControlConfig {
    /// Directory whose immediate children get project quotas. The control
    /// device is created here too.
    pub base_path: PathBuf,

    /// Floor for project id allocation. Ids at or below it are never handed
    /// out, which leaves room for projects managed by other tools.
    pub starting_project_id: Option<u32>,
}

impl ControlConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            starting_project_id: None,
        }
    }

    pub fn with_starting_project_id(mut self, id: u32) -> Self {
        self.starting_project_id = Some(id);
        self
    }
}

/// Owns the mapping between directories and project ids under one base path.
///
/// The cache mirrors the project id attribute stored on each directory. It
/// is built once at construction by scanning the base path and afterwards
/// only changes through [`set_quota`](Self::set_quota) and
/// [`forget`](Self::forget).
///
/// Not synchronized: mutations take `&mut self`, and callers sharing a
/// controller must serialize access themselves.
#[derive(Debug)]
pub struct QuotaController {
    backend: Arc<dyn QuotaOps>,
    base_path: PathBuf,
    backing_device: PathBuf,
    project_ids: HashMap<PathBuf, ProjectId>,
    last_project_id: ProjectId,
}

impl QuotaController {
    /// Initialize project quota control under `config.base_path`.
    ///
    /// Creates the control device if needed, checks that project quotas are
    /// enforced, then rebuilds the path cache from on-disk project ids.
    pub fn new(config: ControlConfig, backend: Arc<dyn QuotaOps>) -> QuotaResult<Self> {
        if config.base_path.as_os_str().is_empty() {
            return Err(QuotaError::config("base path must be provided"));
        }

        let base_path = fs::canonicalize(&config.base_path).map_err(|e| {
            QuotaError::config(format!(
                "base path {} is not accessible: {e}",
                config.base_path.display()
            ))
        })?;
        if !base_path.is_dir() {
            return Err(QuotaError::config(format!(
                "base path {} is not a directory",
                base_path.display()
            )));
        }

        let backing_device = bootstrap::create_backing_device(backend.as_ref(), &base_path)?;
        bootstrap::ensure_project_quota(backend.as_ref(), &backing_device)?;

        let project_ids = bootstrap::scan_project_ids(backend.as_ref(), &base_path)?;

        let floor = ProjectId::new(config.starting_project_id.unwrap_or(0));
        let last_project_id = project_ids.values().copied().fold(floor, ProjectId::max);

        info!(
            base_path = %base_path.display(),
            last_project_id = %last_project_id,
            known_projects = project_ids.len(),
            "new quota control created"
        );

        Ok(Self {
            backend,
            base_path,
            backing_device,
            project_ids,
            last_project_id,
        })
    }

    /// Canonical base path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Control device every quota call goes through.
    pub fn backing_device(&self) -> &Path {
        &self.backing_device
    }

    /// Highest project id allocated or observed so far.
    pub fn last_project_id(&self) -> ProjectId {
        self.last_project_id
    }

    /// Cached project id of a directory.
    pub fn project_id(&self, path: &Path) -> Option<ProjectId> {
        self.project_ids.get(path).copied()
    }

    /// Hard limits currently applied to the project bound to `path`.
    pub fn get_quota(&self, path: &Path) -> QuotaResult<Quota> {
        let project_id = self.lookup(path)?;
        let report = self
            .backend
            .get_project_quota(&self.backing_device, project_id)
            .map_err(|e| {
                QuotaError::quota(
                    format!(
                        "failed to retrieve quota of project {project_id} for path {}",
                        path.display()
                    ),
                    e,
                )
            })?;
        Ok(report.limits)
    }

    /// Current consumption of the project bound to `path`.
    pub fn get_usage(&self, path: &Path) -> QuotaResult<QuotaUsage> {
        let project_id = self.lookup(path)?;
        let report = self
            .backend
            .get_project_quota(&self.backing_device, project_id)
            .map_err(|e| {
                QuotaError::quota(
                    format!(
                        "failed to retrieve usage of project {project_id} for path {}",
                        path.display()
                    ),
                    e,
                )
            })?;
        Ok(report.usage)
    }

    /// Apply `quota` to the directory at `path`.
    ///
    /// The first call for a path allocates the next project id and binds it
    /// to the directory. Later calls only change the limits; the id of a
    /// path never changes.
    ///
    /// `path` must name an immediate child of the canonical base path; only
    /// those are rebuilt by the startup scan.
    pub fn set_quota(&mut self, path: &Path, quota: &Quota) -> QuotaResult<()> {
        self.check_managed(path)?;

        let project_id = match self.project_ids.get(path) {
            Some(id) => *id,
            None => self.bind_new_project(path)?,
        };

        debug!(
            project_id = %project_id,
            last_project_id = %self.last_project_id,
            path = %path.display(),
            size = quota.size,
            inodes = quota.inodes,
            "setting quota"
        );

        self.backend
            .set_project_quota(&self.backing_device, project_id, quota)
            .map_err(|e| {
                QuotaError::quota(
                    format!(
                        "couldn't set project quota ({quota}) for path {}",
                        path.display()
                    ),
                    e,
                )
            })
    }

    /// Drop the cache entry of a directory that no longer exists.
    ///
    /// The id is not returned to any pool: `last_project_id` is untouched,
    /// so it will never be allocated again by this controller.
    pub fn forget(&mut self, path: &Path) -> Option<ProjectId> {
        let removed = self.project_ids.remove(path);
        if let Some(id) = removed {
            debug!(project_id = %id, path = %path.display(), "forgot project id");
        }
        removed
    }

    fn lookup(&self, path: &Path) -> QuotaResult<ProjectId> {
        self.project_id(path)
            .ok_or_else(|| QuotaError::NotFound(path.to_path_buf()))
    }

    fn check_managed(&self, path: &Path) -> QuotaResult<()> {
        let direct_child = path.parent() == Some(self.base_path.as_path())
            && matches!(path.components().next_back(), Some(Component::Normal(_)));
        if !direct_child {
            return Err(QuotaError::config(format!(
                "{} is not a directory directly under base path {}",
                path.display(),
                self.base_path.display()
            )));
        }
        Ok(())
    }

    fn bind_new_project(&mut self, path: &Path) -> QuotaResult<ProjectId> {
        let project_id = self.last_project_id.next().ok_or_else(|| {
            QuotaError::unsupported(format!(
                "project id space exhausted, cannot bind {}",
                path.display()
            ))
        })?;

        self.backend.set_project_id(path, project_id).map_err(|e| {
            QuotaError::io(
                format!("couldn't set project id {project_id} to path {}", path.display()),
                e,
            )
        })?;

        self.project_ids.insert(path.to_path_buf(), project_id);
        self.last_project_id = project_id;

        info!(project_id = %project_id, path = %path.display(), "bound new project id");
        Ok(project_id)
    }
}
