//! XFS project quota control.
//!
//! A project quota limits the blocks and inodes consumed by every file tagged
//! with the same numeric project id, regardless of owner. This module binds
//! one project id to each directory directly under a base path and applies
//! hard limits to it.
//!
//! - [`QuotaOps`] - kernel seam (project id attribute, quotactl, mknod)
//! - [`QuotaController`] - project id allocation and the path cache
//! - [`XfsBackend`](backends::XfsBackend) - the real thing
//! - [`MemoryBackend`](backends::MemoryBackend) - for tests and dry runs
//!
//! ## Design Decisions
//!
//! - **On-disk ids are the source of truth**: the controller's path cache is
//!   rebuilt from the directories' project id attributes at startup and is
//!   never persisted.
//! - **Ids are never reused**: allocation is `last + 1`, and deleting a
//!   directory does not hand its id back.
//! - **One control device per base path**: every quotactl goes through a
//!   block special file created under the base path, which identifies the
//!   filesystem to the kernel.

pub mod backends;
mod bootstrap;
mod control;
mod error;
mod ops;
mod types;

pub use bootstrap::CONTROL_DEVICE_NAME;
pub use control::{ControlConfig, QuotaController};
pub use error::{QuotaError, QuotaResult};
pub use ops::QuotaOps;
pub use types::{ProjectId, ProjectQuota, Quota, QuotaUsage};
