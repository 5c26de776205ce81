//! # xfsvol-core
//!
//! Quota-enforced directories on an XFS filesystem mounted with `pquota`.
//!
//! Every volume is an immediate child directory of a root. Each one is tagged
//! with its own XFS project id, and the project carries hard limits on blocks
//! and inodes. The pieces, leaves first:
//!
//! - [`size`] - human size strings (`512M`) to bytes and back
//! - [`quota::QuotaOps`] - the kernel seam (project ids, quota limits)
//! - [`quota::QuotaController`] - project id allocation and the path cache
//! - [`manager::VolumeManager`] - volume create/list/get/delete
//!
//! Nothing in this crate locks. Callers that share a manager between threads
//! must serialize every call themselves (the plugin driver holds one mutex
//! around each request).

pub mod error;
pub mod manager;
pub mod quota;
pub mod size;

pub use error::ErrorKind;
pub use manager::{ManagerConfig, Volume, VolumeError, VolumeManager, VolumeResult};
pub use quota::{
    backends::{MemoryBackend, XfsBackend},
    ControlConfig, ProjectId, Quota, QuotaController, QuotaError, QuotaOps, QuotaResult,
    QuotaUsage, CONTROL_DEVICE_NAME,
};
pub use size::{format_human_size, parse_human_size, ParseSizeError};
