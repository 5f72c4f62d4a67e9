//! Family preload
//!
//! The storage layer's volumes, replicas, engines and nodes are fetched once
//! per pass and filtered in memory afterwards.

use crate::error::{FetchError, ParseError};
use crate::model::{Engine, Replica, StorageVolume};
use crate::parse::{engines_for_volume, parse_storage_volume, replicas_for_volume};
use crate::resource::{list_items, BatchExecutor, FetchRequest, ResourceKind};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Kinds fetched by [`PreloadedSnapshot::load`], in request order
pub const FAMILY: [ResourceKind; 4] = [
    ResourceKind::StorageVolume,
    ResourceKind::StorageReplica,
    ResourceKind::StorageEngine,
    ResourceKind::StorageNode,
];

/// One listing of the family, or why it is unavailable
type Listing = Result<Arc<Value>, FetchError>;

/// Read-only view of the storage family for one pass
#[derive(Debug, Clone)]
pub struct PreloadedSnapshot {
    volumes: Listing,
    replicas: Listing,
    engines: Listing,
    storage_nodes: Listing,
}

fn items(listing: &Listing) -> &[Value] {
    match listing {
        Ok(payload) => list_items(payload).unwrap_or(&[]),
        Err(_) => &[],
    }
}

fn checked(kind: ResourceKind, listing: Listing) -> Listing {
    let payload = listing?;
    if let Err(e) = list_items(&payload) {
        return Err(FetchError::Decode {
            resource: kind.plural().to_string(),
            message: e.to_string(),
        });
    }
    Ok(payload)
}

impl PreloadedSnapshot {
    /// Fetch the whole family in one narrow batch
    pub async fn load(
        executor: &BatchExecutor,
        namespace: &str,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Self {
        let requests = FAMILY
            .iter()
            .map(|kind| FetchRequest::list(*kind, Some(namespace)))
            .collect();

        let mut results = executor
            .execute_batch(requests, concurrency, cancel)
            .await
            .into_iter()
            .zip(FAMILY)
            .map(|(result, kind)| checked(kind, result.outcome));

        let mut next = || {
            results.next().unwrap_or_else(|| {
                Err(FetchError::Transport {
                    resource: namespace.to_string(),
                    message: "missing preload result".to_string(),
                })
            })
        };

        let snapshot = Self {
            volumes: next(),
            replicas: next(),
            engines: next(),
            storage_nodes: next(),
        };

        tracing::info!(
            "Preloaded storage family in {}: {} volumes, {} replicas, {} engines, {} nodes",
            namespace,
            items(&snapshot.volumes).len(),
            items(&snapshot.replicas).len(),
            items(&snapshot.engines).len(),
            items(&snapshot.storage_nodes).len()
        );
        for (kind, error) in snapshot.failures() {
            tracing::warn!("Preload of {} failed: {}", kind.plural(), error);
        }

        snapshot
    }

    /// Build a snapshot from listings already in hand
    pub fn from_listings(volumes: Value, replicas: Value, engines: Value, storage_nodes: Value) -> Self {
        Self {
            volumes: checked(ResourceKind::StorageVolume, Ok(Arc::new(volumes))),
            replicas: checked(ResourceKind::StorageReplica, Ok(Arc::new(replicas))),
            engines: checked(ResourceKind::StorageEngine, Ok(Arc::new(engines))),
            storage_nodes: checked(ResourceKind::StorageNode, Ok(Arc::new(storage_nodes))),
        }
    }

    /// Family members that could not be loaded
    pub fn failures(&self) -> Vec<(ResourceKind, &FetchError)> {
        FAMILY
            .iter()
            .zip([&self.volumes, &self.replicas, &self.engines, &self.storage_nodes])
            .filter_map(|(kind, listing)| listing.as_ref().err().map(|e| (*kind, e)))
            .collect()
    }

    /// Failures of the listings a per-volume lookup reads from. Storage
    /// nodes are only reported at pass level.
    pub fn lookup_failures(&self) -> Vec<(ResourceKind, &FetchError)> {
        self.failures()
            .into_iter()
            .filter(|(kind, _)| *kind != ResourceKind::StorageNode)
            .collect()
    }

    /// Storage volume whose name equals `handle`
    pub fn volume(&self, handle: &str) -> Option<StorageVolume> {
        items(&self.volumes)
            .iter()
            .filter_map(|item| parse_storage_volume(item).ok())
            .find(|volume| volume.name == handle)
    }

    pub fn replicas(&self, handle: &str) -> (Vec<Replica>, Vec<ParseError>) {
        replicas_for_volume(items(&self.replicas), handle)
    }

    pub fn engines(&self, handle: &str) -> (Vec<Engine>, Vec<ParseError>) {
        engines_for_volume(items(&self.engines), handle)
    }

    pub fn storage_node_count(&self) -> usize {
        items(&self.storage_nodes).len()
    }
}
