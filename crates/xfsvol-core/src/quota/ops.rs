//! Quota operations trait.
//!
//! The narrow set of privileged calls the controller needs from the kernel.
//! Implementations report raw `io::Error`s; the controller adds context.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use super::types::{ProjectId, ProjectQuota, Quota};

/// Kernel-level project quota operations.
///
/// Directory paths are absolute. `device` is always the control device
/// returned by [`create_control_device`](QuotaOps::create_control_device).
pub trait QuotaOps: Send + Sync + fmt::Debug {
    /// Create the control device `name` inside `dir`, identifying the
    /// filesystem that holds `dir`.
    ///
    /// Reusing a device that already exists is not an error.
    fn create_control_device(&self, dir: &Path, name: &str) -> io::Result<PathBuf>;

    /// Whether project quota accounting and enforcement are both on for the
    /// filesystem behind `device`.
    fn project_quota_enabled(&self, device: &Path) -> io::Result<bool>;

    /// Read the project id attribute of a directory (`ProjectId::NONE` if
    /// unset).
    fn get_project_id(&self, dir: &Path) -> io::Result<ProjectId>;

    /// Bind a project id to a directory. New children inherit it.
    fn set_project_id(&self, dir: &Path, id: ProjectId) -> io::Result<()>;

    /// Read the hard limits and usage of a project.
    fn get_project_quota(&self, device: &Path, id: ProjectId) -> io::Result<ProjectQuota>;

    /// Set the hard limits of a project.
    fn set_project_quota(&self, device: &Path, id: ProjectId, quota: &Quota) -> io::Result<()>;
}
