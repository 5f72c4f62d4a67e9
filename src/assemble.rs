//! Cluster Snapshot Assembler
//!
//! Runs node aggregation, the correlation pass, the upgrade lookup and the
//! health checks concurrently and joins them into one [`ClusterSnapshot`].
//! Only the VM listing and the storage node listing can fail a pass.

use crate::correlate::{CorrelationEngine, EngineSettings};
use crate::error::{AggregateError, FetchError};
use crate::health::{ClusterHealthChecks, HealthCheckRunner, HealthSummary, NodeHealth, NodeHealthChecker};
use crate::model::{ClusterSnapshot, ComputeNode, NodeRecord, UpgradeInfo};
use crate::parse::pod::is_running;
use crate::parse::{latest_upgrade, parse_compute_node, parse_pod, parse_storage_node};
use crate::resource::{list_items, BatchExecutor, FetchRequest, ResourceKind, UPGRADE_NAMESPACE};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

pub struct ClusterSnapshotAssembler {
    executor: BatchExecutor,
    engine: CorrelationEngine,
    health_checks: Option<Arc<dyn HealthCheckRunner>>,
    node_health: Option<Arc<dyn NodeHealthChecker>>,
}

impl ClusterSnapshotAssembler {
    /// Assembler with the built-in health checks and no per-node checker
    pub fn new(executor: BatchExecutor, settings: EngineSettings) -> Self {
        let health_checks: Arc<dyn HealthCheckRunner> = Arc::new(ClusterHealthChecks::new(
            executor.clone(),
            settings.storage_namespace.clone(),
        ));

        Self {
            engine: CorrelationEngine::new(executor.clone(), settings),
            executor,
            health_checks: Some(health_checks),
            node_health: None,
        }
    }

    pub fn with_health_checks(mut self, runner: Option<Arc<dyn HealthCheckRunner>>) -> Self {
        self.health_checks = runner;
        self
    }

    pub fn with_node_health(mut self, checker: Arc<dyn NodeHealthChecker>) -> Self {
        self.node_health = Some(checker);
        self
    }

    /// Run one full pass
    pub async fn assemble(&self, cancel: &CancellationToken) -> Result<ClusterSnapshot, AggregateError> {
        let span = tracing::info_span!("pass", id = %Uuid::new_v4());
        self.assemble_inner(cancel).instrument(span).await
    }

    async fn assemble_inner(&self, cancel: &CancellationToken) -> Result<ClusterSnapshot, AggregateError> {
        let started = Instant::now();
        self.executor.cache().sweep_expired().await;

        let (nodes, vms, upgrade_info, health_checks) = tokio::join!(
            self.aggregate_nodes(cancel),
            self.engine.run(cancel),
            self.upgrade_info(cancel),
            self.health_checks(cancel),
        );

        let vms = vms?;
        let nodes = nodes?;
        if cancel.is_cancelled() {
            return Err(AggregateError::Cancelled);
        }

        tracing::info!(
            "Assembled snapshot of {} VMs and {} nodes in {:?}",
            vms.len(),
            nodes.len(),
            started.elapsed()
        );

        Ok(ClusterSnapshot {
            vms,
            nodes,
            upgrade_info,
            health_checks,
        })
    }

    /// Merge the storage and compute node views with pod counts and health.
    ///
    /// A failed storage node listing is fatal; everything else degrades to
    /// missing data.
    async fn aggregate_nodes(&self, cancel: &CancellationToken) -> Result<Vec<NodeRecord>, AggregateError> {
        let settings = self.engine.settings();
        let requests = vec![
            FetchRequest::list(ResourceKind::StorageNode, Some(&settings.storage_namespace)),
            FetchRequest::list(ResourceKind::Node, None),
            FetchRequest::list(ResourceKind::Pod, None),
        ];

        let mut results = self
            .executor
            .execute_batch(requests, settings.batch_concurrency, cancel)
            .await
            .into_iter()
            .map(|result| result.outcome);
        let mut next = || {
            results.next().unwrap_or_else(|| {
                Err(FetchError::Transport {
                    resource: "nodes".to_string(),
                    message: "missing node listing".to_string(),
                })
            })
        };
        let (storage, compute, pods) = (next(), next(), next());

        let storage = match storage {
            Ok(listing) => listing,
            Err(FetchError::Cancelled { .. }) => return Err(AggregateError::Cancelled),
            Err(e) => return Err(AggregateError::NodeListing(e)),
        };
        let storage_items = list_items(&storage).map_err(|e| {
            AggregateError::NodeListing(FetchError::Decode {
                resource: ResourceKind::StorageNode.plural().to_string(),
                message: e.to_string(),
            })
        })?;

        let mut compute_nodes = match compute {
            Ok(listing) => compute_by_name(&listing),
            Err(e) => {
                tracing::warn!("Compute node listing unavailable: {}", e);
                HashMap::new()
            }
        };

        let running_pods = match pods {
            Ok(listing) => running_pods_per_node(&listing),
            Err(e) => {
                tracing::warn!("Pod listing unavailable, running pod counts omitted: {}", e);
                HashMap::new()
            }
        };

        let mut records: Vec<NodeRecord> = storage_items
            .iter()
            .filter_map(|item| match parse_storage_node(item) {
                Ok(node) => Some(node),
                Err(e) => {
                    tracing::warn!("Skipping storage node: {}", e);
                    None
                }
            })
            .map(|node| {
                // Nodes unknown to the compute layer report no running pods
                let kubernetes_info = compute_nodes.remove(&node.name);
                let running_pods = match kubernetes_info {
                    Some(_) => running_pods.get(&node.name).copied().unwrap_or(0),
                    None => 0,
                };
                NodeRecord {
                    kubernetes_info,
                    running_pods,
                    health: None,
                    longhorn_info: node,
                }
            })
            .collect();

        if let Some(checker) = &self.node_health {
            let health = join_all(
                records
                    .iter()
                    .map(|record| check_node(checker.as_ref(), &record.longhorn_info.name)),
            )
            .await;
            for (record, health) in records.iter_mut().zip(health) {
                record.health = health;
            }
        }

        records.sort_by(|a, b| a.longhorn_info.name.cmp(&b.longhorn_info.name));
        Ok(records)
    }

    async fn upgrade_info(&self, cancel: &CancellationToken) -> Option<UpgradeInfo> {
        let request = FetchRequest::list(ResourceKind::Upgrade, Some(UPGRADE_NAMESPACE));

        match self.executor.fetch_one(&request, cancel).await {
            Ok(listing) => latest_upgrade(list_items(&listing).unwrap_or(&[])),
            Err(e) => {
                tracing::warn!("Upgrade status unavailable: {}", e);
                None
            }
        }
    }

    async fn health_checks(&self, cancel: &CancellationToken) -> Option<HealthSummary> {
        let runner = self.health_checks.as_ref()?;
        Some(runner.run_all(cancel).await)
    }
}

async fn check_node(checker: &dyn NodeHealthChecker, node: &str) -> Option<NodeHealth> {
    match checker.check_node(node).await {
        Ok(health) => Some(health),
        Err(e) => {
            tracing::warn!("Health check of node {} failed: {:#}", node, e);
            None
        }
    }
}

fn compute_by_name(listing: &Value) -> HashMap<String, ComputeNode> {
    list_items(listing)
        .unwrap_or(&[])
        .iter()
        .filter_map(|item| parse_compute_node(item).ok())
        .map(|node| (node.name.clone(), node))
        .collect()
}

/// Count pods in a running phase per node
fn running_pods_per_node(listing: &Value) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for pod in list_items(listing)
        .unwrap_or(&[])
        .iter()
        .filter_map(|item| parse_pod(item).ok())
        .filter(|pod| is_running(&pod.phase))
    {
        *counts.entry(pod.node_name).or_insert(0) += 1;
    }
    counts
}
