//! Storage-layer and compute-layer nodes

use super::fields::{
    optional_array, optional_bool, optional_decode, optional_str, optional_str_list, optional_str_map,
    required_str,
};
use crate::error::ParseError;
use crate::model::{ComputeNode, DiskInfo, NodeCondition, StorageNode};
use serde_json::Value;
use std::collections::BTreeMap;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const TIB: f64 = GIB * 1024.0;

const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";

/// Render a byte count as GB or TB with two decimals
pub fn format_bytes(bytes: f64) -> String {
    if bytes >= TIB {
        format!("{:.2} TB", bytes / TIB)
    } else {
        format!("{:.2} GB", bytes / GIB)
    }
}

fn conditions(obj: &Value, path: &str) -> Vec<NodeCondition> {
    optional_decode(obj, path).unwrap_or_default()
}

fn byte_field(disk: &Value, field: &str) -> f64 {
    disk.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

fn parse_disk(disk: &Value) -> DiskInfo {
    let is_schedulable = optional_array(disk, "conditions").iter().any(|c| {
        optional_str(c, "type").as_deref() == Some("Schedulable")
            && optional_str(c, "status").as_deref() == Some("True")
    });

    let scheduled_replicas = disk
        .get("scheduledReplica")
        .and_then(Value::as_object)
        .map(|replicas| {
            replicas
                .iter()
                .filter_map(|(name, size)| Some((name.clone(), size.as_f64()? as i64)))
                .collect()
        })
        .unwrap_or_default();

    DiskInfo {
        name: optional_str(disk, "diskName").unwrap_or_default(),
        path: optional_str(disk, "diskPath").unwrap_or_default(),
        is_schedulable,
        storage_available: format_bytes(byte_field(disk, "storageAvailable")),
        storage_maximum: format_bytes(byte_field(disk, "storageMaximum")),
        storage_scheduled: format_bytes(byte_field(disk, "storageScheduled")),
        scheduled_replicas,
    }
}

/// Parse a storage-layer node. Only the name is required.
pub fn parse_storage_node(obj: &Value) -> Result<StorageNode, ParseError> {
    let mut disks: Vec<DiskInfo> = obj
        .pointer("/status/diskStatus")
        .and_then(Value::as_object)
        .map(|status| status.values().map(parse_disk).collect())
        .unwrap_or_default();
    disks.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(StorageNode {
        name: required_str(obj, "metadata.name")?.to_string(),
        conditions: conditions(obj, "status.conditions"),
        disks,
    })
}

/// Node roles from `node-role.kubernetes.io/*` labels; `worker` when none
pub fn node_roles(labels: &BTreeMap<String, String>) -> Vec<String> {
    let mut roles: Vec<String> = Vec::new();
    let mut push = |role: &str| {
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
    };

    for key in labels.keys() {
        match key.strip_prefix(ROLE_LABEL_PREFIX) {
            Some("control-plane") | Some("master") => push("control-plane"),
            Some("etcd") => push("etcd"),
            Some("worker") => push("worker"),
            _ => {}
        }
    }

    if roles.is_empty() {
        roles.push("worker".to_string());
    }
    roles
}

/// Parse a compute-layer node. Only the name is required.
pub fn parse_compute_node(obj: &Value) -> Result<ComputeNode, ParseError> {
    let name = required_str(obj, "metadata.name")?.to_string();

    let mut node = ComputeNode {
        name,
        roles: node_roles(&optional_str_map(obj, "metadata.labels")),
        conditions: conditions(obj, "status.conditions"),
        node_info: optional_decode(obj, "status.nodeInfo").unwrap_or_default(),
        capacity: optional_str_map(obj, "status.capacity"),
        allocatable: optional_str_map(obj, "status.allocatable"),
        unschedulable: optional_bool(obj, "spec.unschedulable").unwrap_or(false),
        volumes_attached: optional_decode(obj, "status.volumesAttached").unwrap_or_default(),
        volumes_in_use: optional_str_list(obj, "status.volumesInUse"),
        ..Default::default()
    };

    for address in optional_array(obj, "status.addresses") {
        let value = optional_str(address, "address");
        match optional_str(address, "type").as_deref() {
            Some("InternalIP") => node.internal_ip = value,
            Some("ExternalIP") => node.external_ip = value,
            Some("Hostname") => node.hostname = value,
            _ => {}
        }
    }

    Ok(node)
}

impl ComputeNode {
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition_type == "Ready" && c.status == "True")
    }
}
