//! Correlation Engine
//!
//! Produces one [`VmRecord`] per virtual machine. A pass runs in stages:
//!
//! 1. list every VM (the only fatal read)
//! 2. parse VM metadata and collect the distinct storage claims
//! 3. resolve claims, then their persistent volumes, in two wide batches
//! 4. preload the storage family and the pod listing of each namespace
//! 5. assemble entities in fixed-size shards running concurrently
//! 6. merge the shard outputs
//!
//! Any failure after stage 1 is recorded on the affected record. A VM without
//! a storage claim triggers no reads beyond stage 1.

mod claims;
mod preload;
mod shard;

pub use preload::{PreloadedSnapshot, FAMILY};
pub use shard::{shard_ranges, DEFAULT_SHARD_SIZE};

use crate::error::{AggregateError, FetchError};
use crate::model::{RecordError, Severity, VmMetadata, VmRecord};
use crate::parse::fields::optional_str;
use crate::parse::{parse_pod, parse_vm};
use crate::resource::{
    list_items, BatchExecutor, FetchRequest, ResourceKind, DEFAULT_CACHE_TTL, DEFAULT_CONCURRENCY,
    DEFAULT_STORAGE_NAMESPACE,
};
use serde_json::Value;
use shard::{PassContext, PodListing};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Concurrency of the storage family preload
pub const DEFAULT_PRELOAD_CONCURRENCY: usize = 4;

/// Tunables for one engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub cache_ttl: Duration,
    /// Generic batches
    pub batch_concurrency: usize,
    /// Storage family preload
    pub preload_concurrency: usize,
    /// Many same-kind lookups (claims, volumes, pod listings)
    pub wide_concurrency: usize,
    pub shard_size: usize,
    pub storage_namespace: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            batch_concurrency: DEFAULT_CONCURRENCY,
            preload_concurrency: DEFAULT_PRELOAD_CONCURRENCY,
            wide_concurrency: DEFAULT_CONCURRENCY,
            shard_size: DEFAULT_SHARD_SIZE,
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_string(),
        }
    }
}

pub struct CorrelationEngine {
    executor: BatchExecutor,
    settings: EngineSettings,
}

impl CorrelationEngine {
    pub fn new(executor: BatchExecutor, settings: EngineSettings) -> Self {
        Self { executor, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one pass over every virtual machine in the cluster.
    ///
    /// Records are sorted by namespace, then name.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<Vec<VmRecord>, AggregateError> {
        let started = Instant::now();

        let listing = self
            .executor
            .fetch_one(&FetchRequest::list(ResourceKind::VirtualMachine, None), cancel)
            .await
            .map_err(|e| match e {
                FetchError::Cancelled { .. } => AggregateError::Cancelled,
                other => AggregateError::Discovery(other),
            })?;
        let items = list_items(&listing).map_err(AggregateError::MalformedListing)?;

        tracing::info!("Discovered {} virtual machines", items.len());

        let (entities, mut records) = extract_entities(items);
        let claim_keys: BTreeSet<(String, String)> = entities
            .iter()
            .filter_map(|meta| Some((meta.namespace.clone(), meta.claim_name.clone()?)))
            .collect();
        let namespaces: BTreeSet<String> = claim_keys.iter().map(|(ns, _)| ns.clone()).collect();

        let links = claims::resolve_claims(&self.executor, claim_keys, self.settings.wide_concurrency, cancel).await?;

        let (preload, pods) = tokio::join!(
            PreloadedSnapshot::load(
                &self.executor,
                &self.settings.storage_namespace,
                self.settings.preload_concurrency,
                cancel,
            ),
            self.load_pods(namespaces, cancel),
        );
        if cancel.is_cancelled() {
            return Err(AggregateError::Cancelled);
        }

        let ctx = Arc::new(PassContext {
            executor: self.executor.clone(),
            storage_namespace: self.settings.storage_namespace.clone(),
            links,
            preload,
            pods,
        });

        records.extend(self.run_shards(ctx, entities, cancel).await?);
        records.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

        tracing::info!(
            "Correlated {} virtual machines in {:?}",
            records.len(),
            started.elapsed()
        );
        Ok(records)
    }

    async fn load_pods(
        &self,
        namespaces: BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> HashMap<String, Result<PodListing, FetchError>> {
        let namespaces: Vec<String> = namespaces.into_iter().collect();
        let requests = namespaces
            .iter()
            .map(|ns| FetchRequest::list(ResourceKind::Pod, Some(ns)))
            .collect();

        let results = self
            .executor
            .execute_batch(requests, self.settings.wide_concurrency, cancel)
            .await;

        namespaces
            .into_iter()
            .zip(results)
            .map(|(ns, result)| {
                let pods: Result<PodListing, FetchError> = result.outcome.and_then(|listing| {
                    let items = list_items(&listing).map_err(|e| FetchError::Decode {
                        resource: format!("pods/{ns}"),
                        message: e.to_string(),
                    })?;
                    Ok(pod_listing(&ns, items))
                });
                (ns, pods)
            })
            .collect()
    }

    async fn run_shards(
        &self,
        ctx: Arc<PassContext>,
        entities: Vec<VmMetadata>,
        cancel: &CancellationToken,
    ) -> Result<Vec<VmRecord>, AggregateError> {
        let ranges = shard_ranges(entities.len(), self.settings.shard_size);
        tracing::debug!("Assembling {} entities in {} shards", entities.len(), ranges.len());

        let mut entities = entities.into_iter();
        let mut tasks = JoinSet::new();
        for range in ranges {
            let batch: Vec<VmMetadata> = entities.by_ref().take(range.len()).collect();
            let ctx = Arc::clone(&ctx);
            let cancel = cancel.clone();
            tasks.spawn(async move { shard::run_shard(&ctx, batch, &cancel).await });
        }

        let mut records = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(shard) => records.extend(shard),
                Err(e) => tracing::error!("Shard worker failed: {}", e),
            }
        }

        if cancel.is_cancelled() {
            return Err(AggregateError::Cancelled);
        }
        Ok(records)
    }
}

/// Parse one namespace's pods. Malformed pods are kept by UID so the VM
/// that owns them can report the failure.
fn pod_listing(namespace: &str, items: &[Value]) -> PodListing {
    let mut listing = PodListing::default();
    for item in items {
        match parse_pod(item) {
            Ok(pod) => listing.pods.push(pod),
            Err(e) => match optional_str(item, "metadata.uid") {
                Some(uid) => {
                    listing.malformed.insert(uid, e);
                }
                None => tracing::warn!("Skipping pod without UID in {}: {}", namespace, e),
            },
        }
    }
    listing
}

/// Parse every listed VM. Entities whose metadata does not parse come back
/// as finished records carrying the parse failure.
fn extract_entities(items: &[Value]) -> (Vec<VmMetadata>, Vec<VmRecord>) {
    let mut entities = Vec::with_capacity(items.len());
    let mut failed = Vec::new();

    for item in items {
        match parse_vm(item) {
            Ok(meta) => entities.push(meta),
            Err(e) => {
                let mut record = VmRecord {
                    name: optional_str(item, "metadata.name").unwrap_or_default(),
                    namespace: optional_str(item, "metadata.namespace").unwrap_or_default(),
                    ..Default::default()
                };
                tracing::warn!("Failed to parse VM {}/{}: {}", record.namespace, record.name, e);
                let resource = format!("{}/{}", record.namespace, record.name);
                record.push_error(RecordError::new("metadata", resource, e.to_string(), Severity::Warning));
                failed.push(record);
            }
        }
    }

    (entities, failed)
}
