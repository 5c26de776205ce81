//! In-memory quota backend.
//!
//! Directories are real, but project ids and quota records live in memory.
//! Used for testing and for dry runs on filesystems without project quotas.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::quota::ops::QuotaOps;
use crate::quota::types::{ProjectId, ProjectQuota, Quota, QuotaUsage};

/// Identity of a directory inode: `(st_dev, st_ino)`.
///
/// Project ids belong to inodes, not names, so renaming a directory keeps
/// its id just like on XFS.
type InodeKey = (u64, u64);

#[derive(Debug, Default)]
struct State {
    project_ids: HashMap<InodeKey, ProjectId>,
    limits: HashMap<ProjectId, Quota>,
    usage: HashMap<ProjectId, QuotaUsage>,
}

/// In-memory quota backend.
///
/// Thread-safe via an internal mutex. Share it through an `Arc` to let a
/// second controller observe what a first one bound, the way a restarted
/// process would observe on-disk attributes.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
    enforcing: bool,
    limit_capacity: Option<u64>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a backend that enforces project quotas and accepts any limit.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            enforcing: true,
            limit_capacity: None,
        }
    }

    /// Create a backend that reports project quotas as not enforced, like a
    /// filesystem mounted without `pquota`.
    pub fn without_enforcement() -> Self {
        Self {
            enforcing: false,
            ..Self::new()
        }
    }

    /// Create a backend that rejects byte limits above `capacity`.
    pub fn with_limit_capacity(capacity: u64) -> Self {
        Self {
            limit_capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Record consumption for a project, as if files had been written.
    pub fn record_usage(&self, id: ProjectId, usage: QuotaUsage) {
        self.state.lock().usage.insert(id, usage);
    }

    fn directory_key(dir: &Path) -> io::Result<InodeKey> {
        let meta = fs::metadata(dir)?;
        if !meta.is_dir() {
            return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
        }
        Ok((meta.dev(), meta.ino()))
    }

    fn check_device(device: &Path) -> io::Result<()> {
        fs::symlink_metadata(device).map(|_| ())
    }
}

impl QuotaOps for MemoryBackend {
    fn create_control_device(&self, dir: &Path, name: &str) -> io::Result<PathBuf> {
        Self::directory_key(dir)?;
        let path = dir.join(name);
        // stands in for the block special file
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        Ok(path)
    }

    fn project_quota_enabled(&self, device: &Path) -> io::Result<bool> {
        Self::check_device(device)?;
        Ok(self.enforcing)
    }

    fn get_project_id(&self, dir: &Path) -> io::Result<ProjectId> {
        let key = Self::directory_key(dir)?;
        Ok(self
            .state
            .lock()
            .project_ids
            .get(&key)
            .copied()
            .unwrap_or(ProjectId::NONE))
    }

    fn set_project_id(&self, dir: &Path, id: ProjectId) -> io::Result<()> {
        let key = Self::directory_key(dir)?;
        self.state.lock().project_ids.insert(key, id);
        Ok(())
    }

    fn get_project_quota(&self, device: &Path, id: ProjectId) -> io::Result<ProjectQuota> {
        Self::check_device(device)?;
        let state = self.state.lock();
        let limits = state.limits.get(&id).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no quota record for project {id}"),
            )
        })?;
        Ok(ProjectQuota {
            limits,
            usage: state.usage.get(&id).copied().unwrap_or_default(),
        })
    }

    fn set_project_quota(&self, device: &Path, id: ProjectId, quota: &Quota) -> io::Result<()> {
        Self::check_device(device)?;
        if let Some(capacity) = self.limit_capacity.filter(|cap| quota.size > *cap) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("limit of {} bytes exceeds device capacity {capacity}", quota.size),
            ));
        }
        self.state.lock().limits.insert(id, *quota);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_project_id_follows_inode() {
        let dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let before = dir.path().join("before");
        let after = dir.path().join("after");
        fs::create_dir(&before).unwrap();

        backend.set_project_id(&before, ProjectId::new(3)).unwrap();
        fs::rename(&before, &after).unwrap();

        assert_eq!(backend.get_project_id(&after).unwrap(), ProjectId::new(3));
    }

    #[test]
    fn test_project_id_requires_directory() {
        let dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let file = dir.path().join("file");
        fs::write(&file, b"").unwrap();

        assert!(backend.set_project_id(&file, ProjectId::new(1)).is_err());
        assert!(backend.get_project_id(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_quota_requires_record() {
        let dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new();
        let device = backend.create_control_device(dir.path(), "dev").unwrap();

        let err = backend.get_project_quota(&device, ProjectId::new(9)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_capacity_rejects_large_limits() {
        let dir = TempDir::new().unwrap();
        let backend = MemoryBackend::with_limit_capacity(4096);
        let device = backend.create_control_device(dir.path(), "dev").unwrap();

        backend
            .set_project_quota(&device, ProjectId::new(1), &Quota::size(4096))
            .unwrap();
        assert!(
            backend
                .set_project_quota(&device, ProjectId::new(1), &Quota::size(4097))
                .is_err()
        );
    }
}
