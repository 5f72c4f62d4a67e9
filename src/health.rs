//! Health checks
//!
//! The assembler treats health results as opaque values attached to the
//! snapshot. [`HealthCheckRunner`] and [`NodeHealthChecker`] are the seams;
//! [`ClusterHealthChecks`] is the built-in runner.

use crate::parse::{parse_compute_node, parse_storage_volume};
use crate::resource::{list_items, BatchExecutor, FetchRequest, ResourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Warning,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub check_name: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub warning_checks: usize,
    pub last_run: DateTime<Utc>,
    pub results: Vec<HealthCheckResult>,
}

impl HealthSummary {
    pub fn from_results(results: Vec<HealthCheckResult>, last_run: DateTime<Utc>) -> Self {
        let count = |status: CheckStatus| results.iter().filter(|r| r.status == status).count();

        Self {
            total_checks: results.len(),
            passed_checks: count(CheckStatus::Passed),
            failed_checks: count(CheckStatus::Failed),
            warning_checks: count(CheckStatus::Warning),
            last_run,
            results,
        }
    }
}

/// Per-node health as reported by a [`NodeHealthChecker`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub node_name: String,
    pub issue_count: usize,
    pub severity: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remediation: Vec<String>,
}

/// Cluster-wide health checks
#[async_trait]
pub trait HealthCheckRunner: Send + Sync {
    async fn run_all(&self, cancel: &CancellationToken) -> HealthSummary;
}

/// Health of a single node
#[async_trait]
pub trait NodeHealthChecker: Send + Sync {
    async fn check_node(&self, node_name: &str) -> anyhow::Result<NodeHealth>;
}

/// Built-in checks over the node and storage volume listings
pub struct ClusterHealthChecks {
    executor: BatchExecutor,
    storage_namespace: String,
}

impl ClusterHealthChecks {
    pub fn new(executor: BatchExecutor, storage_namespace: impl Into<String>) -> Self {
        Self {
            executor,
            storage_namespace: storage_namespace.into(),
        }
    }
}

fn finish(mut result: HealthCheckResult, started: Instant) -> HealthCheckResult {
    result.duration = Some(format!("{:?}", started.elapsed()));
    result
}

fn new_result(name: &str) -> HealthCheckResult {
    HealthCheckResult {
        check_name: name.to_string(),
        status: CheckStatus::Passed,
        message: None,
        error: None,
        details: Vec::new(),
        timestamp: Utc::now(),
        duration: None,
    }
}

/// Every node must be ready and schedulable
fn check_nodes(listing: Result<&Value, String>) -> HealthCheckResult {
    let started = Instant::now();
    let mut result = new_result("nodes");

    let items = match listing.and_then(|v| list_items(v).map_err(|e| e.to_string())) {
        Ok(items) => items,
        Err(e) => {
            result.status = CheckStatus::Failed;
            result.error = Some(format!("Failed to list nodes: {e}"));
            return finish(result, started);
        }
    };

    for item in items {
        let Ok(node) = parse_compute_node(item) else {
            continue;
        };
        if node.unschedulable {
            result.details.push(format!("Node {} is unschedulable", node.name));
        }
        if !node.is_ready() {
            result.details.push(format!("Node {} is not ready", node.name));
        }
    }

    if result.details.is_empty() {
        result.message = Some("All nodes are ready".to_string());
    } else {
        result.status = CheckStatus::Failed;
        result.error = Some(format!("{} node issues found", result.details.len()));
    }
    finish(result, started)
}

/// Volumes should be healthy; degraded volumes are warnings, faulted ones failures
fn check_volumes(listing: Result<&Value, String>) -> HealthCheckResult {
    let started = Instant::now();
    let mut result = new_result("volumes");

    let items = match listing.and_then(|v| list_items(v).map_err(|e| e.to_string())) {
        Ok(items) => items,
        Err(e) => {
            result.status = CheckStatus::Failed;
            result.error = Some(format!("Failed to list storage volumes: {e}"));
            return finish(result, started);
        }
    };

    let mut faulted = false;
    for volume in items.iter().filter_map(|item| parse_storage_volume(item).ok()) {
        match volume.robustness.as_deref() {
            Some("degraded") => result
                .details
                .push(format!("Volume {} is degraded", volume.name)),
            Some("faulted") => {
                faulted = true;
                result.details.push(format!("Volume {} is faulted", volume.name));
            }
            _ => {}
        }
    }

    if faulted {
        result.status = CheckStatus::Failed;
    } else if !result.details.is_empty() {
        result.status = CheckStatus::Warning;
    } else {
        result.message = Some(format!("{} volumes healthy", items.len()));
    }
    finish(result, started)
}

#[async_trait]
impl HealthCheckRunner for ClusterHealthChecks {
    async fn run_all(&self, cancel: &CancellationToken) -> HealthSummary {
        let last_run = Utc::now();
        let requests = vec![
            FetchRequest::list(ResourceKind::Node, None),
            FetchRequest::list(ResourceKind::StorageVolume, Some(&self.storage_namespace)),
        ];

        let results = self.executor.execute_batch(requests, 2, cancel).await;
        let listing = |i: usize| -> Result<&Value, String> {
            match &results[i].outcome {
                Ok(payload) => Ok(payload.as_ref()),
                Err(e) => Err(e.to_string()),
            }
        };

        HealthSummary::from_results(vec![check_nodes(listing(0)), check_volumes(listing(1))], last_run)
    }
}
