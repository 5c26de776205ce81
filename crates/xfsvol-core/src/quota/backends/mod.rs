//! Quota backends.
//!
//! Backends implement [`QuotaOps`](super::QuotaOps) for different targets.

mod memory;
mod xfs;

pub use memory::MemoryBackend;
pub use xfs::XfsBackend;
