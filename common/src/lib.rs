//! # autoscan-common
//!
//! Shared vocabulary of the auto-discovery controller: the policy document, the observed
//! cluster resources, the targets derived from them, the persisted scan jobs and the error
//! taxonomy. Nothing in here performs I/O except [`config::AutoDiscoveryConfig::load`].

pub mod cluster;
pub mod config;
pub mod error;
pub mod utils;
