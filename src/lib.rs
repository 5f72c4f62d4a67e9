//! Correlate virtual machines with their storage claims, volumes, replicas,
//! engines, pods, instances and migrations into one cluster snapshot.
//!
//! # Module Structure
//!
//! - [`resource`] - registry, response cache and batch executor
//! - [`kube`] - HTTP implementation of the resource client
//! - [`parse`] - entity parsers
//! - [`correlate`] - the per-VM correlation pipeline
//! - [`assemble`] - top-level snapshot assembly
//! - [`health`] - health check collaborators
//! - [`model`] - entities and output records
//! - [`config`] - persistent configuration

pub mod assemble;
pub mod config;
pub mod correlate;
pub mod error;
pub mod health;
pub mod kube;
pub mod model;
pub mod parse;
pub mod resource;

/// Version injected at compile time via VMSNAP_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("VMSNAP_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
