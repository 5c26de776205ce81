//! Docker volume plugin for XFS project-quota volumes.
//!
//! The [`Driver`] maps plugin endpoints onto an `xfsvol_core::VolumeManager`;
//! [`server`] exposes it on a Unix socket the Docker daemon discovers.

pub mod constants;
pub mod driver;
pub mod protocol;
pub mod server;

pub use driver::{Driver, DriverConfig, Reply};
