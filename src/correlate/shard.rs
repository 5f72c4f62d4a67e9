//! Per-entity assembly
//!
//! Everything that can be batched has been resolved before a shard starts.
//! What remains per entity is the instance lookup, the migration listing of
//! its namespace (shared through the cache), and the attachment tickets of
//! its volume. Entities without a storage claim are emitted as discovered.

use super::claims::StorageLink;
use super::preload::PreloadedSnapshot;
use crate::error::{FetchError, ParseError};
use crate::model::{Instance, Pod, PodRecord, RecordError, Severity, VmMetadata, VmRecord};
use crate::parse::{migrations_for_instance, parse_attachment_tickets, parse_instance};
use crate::resource::{list_items, BatchExecutor, FetchRequest, ResourceKind};
use std::collections::HashMap;
use std::ops::Range;
use tokio_util::sync::CancellationToken;

/// Shard size used when a caller passes zero
pub const DEFAULT_SHARD_SIZE: usize = 20;

/// Split `len` entities into consecutive ranges of at most `size`
pub fn shard_ranges(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = if size == 0 { DEFAULT_SHARD_SIZE } else { size };
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Pods of one namespace. Pods that fail to parse are kept by UID.
#[derive(Debug, Clone, Default)]
pub(crate) struct PodListing {
    pub pods: Vec<Pod>,
    pub malformed: HashMap<String, ParseError>,
}

/// Read-only state shared by every shard of one pass
pub(crate) struct PassContext {
    pub executor: BatchExecutor,
    pub storage_namespace: String,
    pub links: HashMap<(String, String), StorageLink>,
    pub preload: PreloadedSnapshot,
    /// Pod listing per namespace
    pub pods: HashMap<String, Result<PodListing, FetchError>>,
}

/// Assemble every entity of one shard. Stops early once `cancel` fires.
pub(crate) async fn run_shard(
    ctx: &PassContext,
    entities: Vec<VmMetadata>,
    cancel: &CancellationToken,
) -> Vec<VmRecord> {
    let mut records = Vec::with_capacity(entities.len());
    for meta in &entities {
        if cancel.is_cancelled() {
            break;
        }
        records.push(assemble_entity(ctx, meta, cancel).await);
    }
    records
}

pub(crate) async fn assemble_entity(
    ctx: &PassContext,
    meta: &VmMetadata,
    cancel: &CancellationToken,
) -> VmRecord {
    let mut record = VmRecord::from_metadata(meta);

    let Some(claim) = &meta.claim_name else {
        return record;
    };
    attach_storage(ctx, &mut record, claim, meta.is_terminal(), cancel).await;

    let instance = fetch_instance(ctx, meta, &mut record, cancel).await;

    attach_pods(ctx, &mut record, instance.as_ref());

    if let Some(instance) = &instance {
        attach_migrations(ctx, &mut record, instance, cancel).await;
    }

    if let Some(instance) = instance {
        record.instances.push(instance);
    }

    record
}

async fn attach_storage(
    ctx: &PassContext,
    record: &mut VmRecord,
    claim: &str,
    terminal: bool,
    cancel: &CancellationToken,
) {
    let key = (record.namespace.clone(), claim.to_string());
    let Some(link) = ctx.links.get(&key) else {
        return;
    };

    record.errors.extend(link.errors_for(terminal));

    if let Some(info) = &link.claim {
        record.claim_status = info.phase.clone();
        record.volume_name = info.volume_name.clone();
    }

    let Some(pv) = &link.volume else {
        return;
    };

    record.capacity = pv.capacity.clone();
    if record.storage_class.is_none() {
        record.storage_class = pv.storage_class.clone();
    }
    record.volume_handle = pv.volume_handle.clone();

    let Some(handle) = pv.volume_handle.as_deref().filter(|_| pv.is_longhorn()) else {
        return;
    };

    for (kind, error) in ctx.preload.lookup_failures() {
        record.push_error(RecordError::new(
            kind.key(),
            handle,
            error.to_string(),
            Severity::Warning,
        ));
    }

    if let Some(volume) = ctx.preload.volume(handle) {
        record.volume_robustness = volume.robustness;
        record.volume_state = volume.state;
    }
    let (replicas, replica_errors) = ctx.preload.replicas(handle);
    let (engines, engine_errors) = ctx.preload.engines(handle);
    record.replicas = replicas;
    record.engines = engines;
    for (kind, error) in replica_errors
        .into_iter()
        .map(|e| (ResourceKind::StorageReplica, e))
        .chain(engine_errors.into_iter().map(|e| (ResourceKind::StorageEngine, e)))
    {
        record.push_error(RecordError::new(kind.key(), handle, error.to_string(), Severity::Warning));
    }

    let request = FetchRequest::get(ResourceKind::VolumeAttachment, Some(&ctx.storage_namespace), handle);
    match ctx.executor.fetch_one(&request, cancel).await {
        Ok(payload) => record.attachment_tickets = Some(parse_attachment_tickets(&payload)),
        Err(e) if e.is_not_found() || e.is_cancelled() => {
            tracing::debug!("No attachment tickets for {}: {}", handle, e);
        }
        Err(e) => record.push_error(RecordError::new("lhva", handle, e.to_string(), Severity::Warning)),
    }
}

async fn fetch_instance(
    ctx: &PassContext,
    meta: &VmMetadata,
    record: &mut VmRecord,
    cancel: &CancellationToken,
) -> Option<Instance> {
    let resource = format!("{}/{}", meta.namespace, meta.name);
    let request = FetchRequest::get(ResourceKind::VirtualMachineInstance, Some(&meta.namespace), &meta.name);

    match ctx.executor.fetch_one(&request, cancel).await {
        Ok(payload) => match parse_instance(&payload) {
            Ok(instance) => Some(instance),
            Err(e) => {
                record.push_error(RecordError::new("vmi-parse", resource, e.to_string(), Severity::Warning));
                None
            }
        },
        Err(e) if e.is_cancelled() => None,
        Err(e) if e.is_not_found() => {
            // An absent instance is expected once the VM is stopping or stopped
            let severity = if meta.is_terminal() {
                Severity::Info
            } else {
                Severity::Warning
            };
            record.push_error(RecordError::new("vmi", resource, e.to_string(), severity));
            None
        }
        Err(e) => {
            record.push_error(RecordError::new("vmi", resource, e.to_string(), Severity::Warning));
            None
        }
    }
}

fn attach_pods(ctx: &PassContext, record: &mut VmRecord, instance: Option<&Instance>) {
    let needs_pods = match instance {
        Some(instance) => !instance.active_pods.is_empty(),
        None => record.claim_name.is_some(),
    };
    if !needs_pods {
        return;
    }

    let empty = PodListing::default();
    let listing = match ctx.pods.get(&record.namespace) {
        Some(Ok(listing)) => listing,
        Some(Err(e)) => {
            let error = RecordError::new("pod", record.namespace.clone(), e.to_string(), Severity::Warning);
            record.push_error(error);
            return;
        }
        None => &empty,
    };
    let pods = listing.pods.as_slice();

    match instance {
        Some(instance) => {
            for (uid, node) in &instance.active_pods {
                if let Some(e) = listing.malformed.get(uid) {
                    record.push_error(RecordError::new("pod", uid.as_str(), e.to_string(), Severity::Warning));
                }
                let pod = pods.iter().find(|pod| pod.uid.as_deref() == Some(uid.as_str()));
                record.pods.push(match pod {
                    Some(pod) => PodRecord {
                        name: Some(pod.name.clone()),
                        vmi: instance.name.clone(),
                        node_id: pod.node_name.clone(),
                        status: pod.phase.clone(),
                    },
                    None => PodRecord {
                        name: None,
                        vmi: instance.name.clone(),
                        node_id: node.clone(),
                        status: "Unknown".to_string(),
                    },
                });
            }
        }
        None => {
            let Some(claim) = record.claim_name.clone() else {
                return;
            };
            if let Some(pod) = pods.iter().find(|pod| pod.claim_names.contains(&claim)) {
                record.pod_name = Some(pod.name.clone());
                record.pods.push(PodRecord {
                    name: Some(pod.name.clone()),
                    vmi: record.name.clone(),
                    node_id: pod.node_name.clone(),
                    status: pod.phase.clone(),
                });
            }
        }
    }
}

async fn attach_migrations(
    ctx: &PassContext,
    record: &mut VmRecord,
    instance: &Instance,
    cancel: &CancellationToken,
) {
    let request = FetchRequest::list(ResourceKind::VirtualMachineInstanceMigration, Some(&record.namespace));

    let listing = match ctx.executor.fetch_one(&request, cancel).await {
        Ok(listing) => listing,
        Err(e) if e.is_cancelled() => return,
        Err(e) => {
            record.push_error(RecordError::new("vmim", instance.name.clone(), e.to_string(), Severity::Info));
            return;
        }
    };

    let items = match list_items(&listing) {
        Ok(items) => items,
        Err(e) => {
            record.push_error(RecordError::new("vmim", instance.name.clone(), e.to_string(), Severity::Info));
            return;
        }
    };

    let pods: &[Pod] = match ctx.pods.get(&record.namespace) {
        Some(Ok(listing)) => &listing.pods,
        _ => &[],
    };

    record.migrations = migrations_for_instance(items, &instance.name)
        .into_iter()
        .map(|mut migration| {
            if let Some(target) = migration.target_pod() {
                let pod = pods.iter().find(|pod| pod.name == target);
                migration.target_pod_exists = Some(pod.is_some());
                migration.target_pod_status = pod.map(|pod| pod.phase.clone());
            }
            migration
        })
        .collect();
}
