//! Quota control types.

use std::fmt;

/// Numeric tag binding a directory (and everything created under it) to a
/// quota scope.
///
/// `ProjectId::NONE` (0) means the directory carries no project.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ProjectId(u32);

impl ProjectId {
    /// The reserved "no project" id.
    pub const NONE: ProjectId = ProjectId(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The id following this one, or `None` once the id space is exhausted.
    pub fn next(self) -> Option<ProjectId> {
        self.0.checked_add(1).map(ProjectId)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ProjectId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Hard limits applied to a project.
///
/// Zero in either field means no limit in that dimension, which is how XFS
/// itself treats a zero hard limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quota {
    /// Maximum bytes.
    pub size: u64,
    /// Maximum inodes.
    pub inodes: u64,
}

impl Quota {
    pub fn new(size: u64, inodes: u64) -> Self {
        Self { size, inodes }
    }

    /// A quota on bytes only.
    pub fn size(size: u64) -> Self {
        Self { size, inodes: 0 }
    }

    pub fn is_unlimited(&self) -> bool {
        self.size == 0 && self.inodes == 0
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "size={} inodes={}", self.size, self.inodes)
    }
}

/// Current consumption of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaUsage {
    pub bytes: u64,
    pub inodes: u64,
}

/// What a quota-get call reports for a project: its limits and usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectQuota {
    pub limits: Quota,
    pub usage: QuotaUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_next() {
        assert_eq!(ProjectId::NONE.next(), Some(ProjectId::new(1)));
        assert_eq!(ProjectId::new(41).next(), Some(ProjectId::new(42)));
        assert_eq!(ProjectId::new(u32::MAX).next(), None);
        assert!(ProjectId::default().is_none());
    }
}
