//! Entity parsers
//!
//! Pure functions from decoded API objects to the typed entities in
//! [`crate::model`]. None of them perform I/O.
//!
//! - [`vm`] - virtual machine metadata and storage claim discovery
//! - [`storage`] - claims, persistent volumes, storage volumes, replicas, engines
//! - [`pod`] - pods
//! - [`instance`] - running instances
//! - [`migration`] - instance migrations
//! - [`node`] - storage-layer and compute-layer nodes
//! - [`upgrade`] - cluster upgrade status

pub mod fields;
pub mod instance;
pub mod migration;
pub mod node;
pub mod pod;
pub mod storage;
pub mod upgrade;
pub mod vm;

pub use instance::parse_instance;
pub use migration::{migrations_for_instance, parse_migration};
pub use node::{parse_compute_node, parse_storage_node};
pub use pod::parse_pod;
pub use storage::{
    bound_volume_name, engines_for_volume, parse_attachment_tickets, parse_claim, parse_engine, parse_persistent_volume,
    parse_replica, parse_storage_volume, replicas_for_volume,
};
pub use upgrade::latest_upgrade;
pub use vm::parse_vm;
