//! Two-hop storage resolution: claim, then the persistent volume it is bound to.

use crate::error::{AggregateError, FetchError};
use crate::model::{ClaimInfo, PersistentVolumeInfo, RecordError, Severity};
use crate::parse::{bound_volume_name, parse_claim, parse_persistent_volume};
use crate::resource::{BatchExecutor, FetchRequest, ResourceKind};
use std::collections::{BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;

/// Namespace and name of a storage claim
pub(crate) type ClaimKey = (String, String);

/// A failure on one hop. `not_found` marks a resource that does not exist,
/// which owners in a terminal state report at info level.
#[derive(Debug, Clone)]
pub(crate) struct LinkError {
    pub error: RecordError,
    pub not_found: bool,
}

impl LinkError {
    fn fetch(kind: &str, resource: &str, error: &FetchError) -> Self {
        Self {
            error: RecordError::new(kind, resource, error.to_string(), Severity::Warning),
            not_found: error.is_not_found(),
        }
    }

    fn other(error: RecordError) -> Self {
        Self { error, not_found: false }
    }
}

/// What is known about one claim after both hops
#[derive(Debug, Clone, Default)]
pub(crate) struct StorageLink {
    pub claim: Option<ClaimInfo>,
    pub volume: Option<PersistentVolumeInfo>,
    pub errors: Vec<LinkError>,
}

impl StorageLink {
    /// Errors as seen by one owner
    pub fn errors_for(&self, terminal: bool) -> impl Iterator<Item = RecordError> + '_ {
        self.errors.iter().map(move |failure| {
            let mut error = failure.error.clone();
            if terminal && failure.not_found {
                error.severity = Severity::Info;
            }
            error
        })
    }
}

/// Resolve every claim in `keys` to its bound persistent volume.
///
/// Each claim gets an entry. Failures at either hop are recorded on the
/// entry and never abort the others.
pub(crate) async fn resolve_claims(
    executor: &BatchExecutor,
    keys: BTreeSet<ClaimKey>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<HashMap<ClaimKey, StorageLink>, AggregateError> {
    let mut links: HashMap<ClaimKey, StorageLink> = HashMap::with_capacity(keys.len());
    if keys.is_empty() {
        return Ok(links);
    }

    let keys: Vec<ClaimKey> = keys.into_iter().collect();
    let requests = keys
        .iter()
        .map(|(ns, name)| FetchRequest::get(ResourceKind::PersistentVolumeClaim, Some(ns), name))
        .collect();

    let claim_results = executor.execute_batch(requests, concurrency, cancel).await;
    if cancel.is_cancelled() {
        return Err(AggregateError::Cancelled);
    }

    // Claims bound to each volume; two claims never share one, but a map keeps it honest
    let mut bound: HashMap<String, Vec<ClaimKey>> = HashMap::new();

    for (key, result) in keys.into_iter().zip(claim_results) {
        let resource = format!("{}/{}", key.0, key.1);
        let mut link = StorageLink::default();

        match &result.outcome {
            Err(e) => link.errors.push(LinkError::fetch("pvc", &resource, e)),
            Ok(payload) => match parse_claim(payload) {
                Err(e) => link.errors.push(LinkError::other(RecordError::new(
                    "pvc",
                    &resource,
                    e.to_string(),
                    Severity::Warning,
                ))),
                Ok(claim) => {
                    match bound_volume_name(payload) {
                        Ok(volume) => bound.entry(volume.to_string()).or_default().push(key.clone()),
                        Err(_) => link.errors.push(LinkError::other(RecordError::new(
                            "pvc",
                            &resource,
                            format!(
                                "claim is not bound (phase {})",
                                claim.phase.as_deref().unwrap_or("Pending")
                            ),
                            Severity::Info,
                        ))),
                    }
                    link.claim = Some(claim);
                }
            },
        }

        links.insert(key, link);
    }

    let volumes: Vec<String> = bound.keys().cloned().collect();
    let requests = volumes
        .iter()
        .map(|name| FetchRequest::get(ResourceKind::PersistentVolume, None, name))
        .collect();

    let volume_results = executor.execute_batch(requests, concurrency, cancel).await;
    if cancel.is_cancelled() {
        return Err(AggregateError::Cancelled);
    }

    for (volume, result) in volumes.into_iter().zip(volume_results) {
        let parsed = match &result.outcome {
            Ok(payload) => parse_persistent_volume(payload).map_err(|e| {
                LinkError::other(RecordError::new("pv", &volume, e.to_string(), Severity::Warning))
            }),
            Err(e) => Err(LinkError::fetch("pv", &volume, e)),
        };

        for key in bound.remove(&volume).unwrap_or_default() {
            let Some(link) = links.get_mut(&key) else {
                continue;
            };
            match &parsed {
                Ok(pv) => link.volume = Some(pv.clone()),
                Err(failure) => link.errors.push(failure.clone()),
            }
        }
    }

    tracing::debug!("Resolved {} claims", links.len());
    Ok(links)
}
