//! Domain entities and the snapshot they are assembled into.
//!
//! Entities are produced by the parsers in [`crate::parse`]; the record types
//! at the bottom are what the engine emits. Everything serializes in
//! camelCase and omits fields that are naturally absent.

use crate::health::{HealthSummary, NodeHealth};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Virtual machine
// ============================================================================

/// Fields read from a virtual machine object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmMetadata {
    pub name: String,
    pub namespace: String,
    pub finalizers: Vec<String>,
    /// Value of the removed-claims annotation, if set
    pub removed_claims: Option<String>,
    /// First storage claim the VM references
    pub claim_name: Option<String>,
    pub image_id: Option<String>,
    pub storage_class: Option<String>,
    pub printable_status: Option<String>,
    /// Status of the most recent condition
    pub status: Option<String>,
    /// Reason of the most recent condition
    pub status_reason: Option<String>,
}

impl VmMetadata {
    /// Whether the VM is going away or already stopped, so its instance is
    /// expected to be absent.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.printable_status.as_deref(),
            Some("Terminating") | Some("Stopped")
        )
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Storage claim
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimInfo {
    pub name: String,
    pub namespace: String,
    /// Name of the bound persistent volume
    pub volume_name: Option<String>,
    pub phase: Option<String>,
}

/// Persistent volume
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistentVolumeInfo {
    pub name: String,
    pub storage_class: Option<String>,
    pub capacity: Option<String>,
    pub access_modes: Vec<String>,
    pub csi_driver: Option<String>,
    pub volume_handle: Option<String>,
}

/// CSI driver name of the replicated block storage layer
pub const LONGHORN_CSI_DRIVER: &str = "driver.longhorn.io";

impl PersistentVolumeInfo {
    pub fn is_longhorn(&self) -> bool {
        self.csi_driver.as_deref() == Some(LONGHORN_CSI_DRIVER)
    }
}

/// Block volume in the storage layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageVolume {
    pub name: String,
    pub robustness: Option<String>,
    pub state: Option<String>,
    /// Node the volume is attached to
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplicaCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

/// Volume replica
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Replica {
    pub name: String,
    pub node_id: String,
    pub volume_name: String,
    pub engine_name: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<String>,
    pub started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_manager: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_ref_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ReplicaCondition>,
    #[serde(rename = "storageIP", skip_serializing_if = "Option::is_none")]
    pub storage_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub size: String,
    #[serde(default, alias = "usercreated")]
    pub user_created: bool,
    #[serde(default)]
    pub removed: bool,
}

/// Volume engine
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Engine {
    pub name: String,
    pub volume_name: String,
    pub active: bool,
    pub current_state: String,
    pub started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub snapshots: BTreeMap<String, Snapshot>,
}

// ============================================================================
// Compute
// ============================================================================

/// Pod
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pod {
    pub name: String,
    pub uid: Option<String>,
    pub node_name: String,
    pub phase: String,
    /// Name of the first owner reference
    pub owner_name: Option<String>,
    /// Claims mounted by the pod
    pub claim_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestOsInfo {
    #[serde(default)]
    pub kernel_release: String,
    #[serde(default)]
    pub kernel_version: String,
    #[serde(default)]
    pub machine: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pretty_name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    #[serde(default)]
    pub guest_at_boot: String,
    #[serde(default)]
    pub guest_current: String,
    #[serde(default)]
    pub guest_requested: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuTopology {
    #[serde(default)]
    pub cores: u32,
    #[serde(default)]
    pub sockets: u32,
    #[serde(default)]
    pub threads: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuDomain {
    #[serde(default)]
    pub cores: u32,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub name: String,
    pub interface_name: String,
    pub ip_address: String,
    pub mac: String,
}

/// Migration state embedded in an instance's status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_configuration: Option<MigrationConfiguration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfiguration {
    #[serde(default)]
    pub allow_auto_converge: bool,
    #[serde(default)]
    pub allow_post_copy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_per_migration: Option<String>,
    #[serde(default, rename = "completionTimeoutPerGiB", skip_serializing_if = "Option::is_none")]
    pub completion_timeout_per_gib: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_migrations_per_cluster: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_outbound_migrations_per_node: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_timeout: Option<i64>,
    #[serde(default)]
    pub unsafe_migration_override: bool,
}

/// Running virtual machine instance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    pub phase: String,
    /// Pod UID to node name
    pub active_pods: BTreeMap<String, String>,
    #[serde(rename = "guestOSInfo", skip_serializing_if = "Option::is_none")]
    pub guest_os_info: Option<GuestOsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_info: Option<MemoryInfo>,
    #[serde(rename = "currentCPUTopology", skip_serializing_if = "Option::is_none")]
    pub current_cpu_topology: Option<CpuTopology>,
    #[serde(rename = "cpuDomain", skip_serializing_if = "Option::is_none")]
    pub cpu_domain: Option<CpuDomain>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<NetworkInterface>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_state: Option<MigrationState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTransition {
    pub phase: String,
    pub timestamp: String,
}

/// Instance migration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Migration {
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vmi_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub phase_transitions: Vec<PhaseTransition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_phase_transition: Option<PhaseTransition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<MigrationState>,
    /// Set once the target pod has been looked up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_pod_exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_pod_status: Option<String>,
}

impl Migration {
    pub fn target_pod(&self) -> Option<&str> {
        self.state.as_ref()?.target_pod.as_deref()
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCondition {
    #[serde(rename = "type", default)]
    pub condition_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskInfo {
    pub name: String,
    pub path: String,
    pub is_schedulable: bool,
    pub storage_available: String,
    pub storage_maximum: String,
    pub storage_scheduled: String,
    pub scheduled_replicas: BTreeMap<String, i64>,
}

/// Node as seen by the storage layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageNode {
    pub name: String,
    pub conditions: Vec<NodeCondition>,
    pub disks: Vec<DiskInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSystemInfo {
    #[serde(default)]
    pub architecture: String,
    #[serde(default, rename = "bootID")]
    pub boot_id: String,
    #[serde(default)]
    pub container_runtime_version: String,
    #[serde(default)]
    pub kernel_version: String,
    #[serde(default)]
    pub kube_proxy_version: String,
    #[serde(default)]
    pub kubelet_version: String,
    #[serde(default, rename = "machineID")]
    pub machine_id: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub os_image: String,
    #[serde(default, rename = "systemUUID")]
    pub system_uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedVolume {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_path: String,
}

/// Node as seen by the compute layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeNode {
    pub name: String,
    pub roles: Vec<String>,
    #[serde(rename = "internalIP", skip_serializing_if = "Option::is_none")]
    pub internal_ip: Option<String>,
    #[serde(rename = "externalIP", skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub conditions: Vec<NodeCondition>,
    pub node_info: NodeSystemInfo,
    pub capacity: BTreeMap<String, String>,
    pub allocatable: BTreeMap<String, String>,
    pub unschedulable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes_attached: Vec<AttachedVolume>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes_in_use: Vec<String>,
}

// ============================================================================
// Upgrade
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeInfo {
    pub version: String,
    pub previous_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_time: Option<DateTime<Utc>>,
    pub state: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_statuses: BTreeMap<String, String>,
}

// ============================================================================
// Output records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A failure absorbed while assembling a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordError {
    /// Resource kind the failure concerns (`pvc`, `vmi`, ...)
    pub kind: String,
    pub resource: String,
    pub message: String,
    pub severity: Severity,
}

impl RecordError {
    pub fn new(
        kind: &str,
        resource: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            kind: kind.to_string(),
            resource: resource.into(),
            message: message.into(),
            severity,
        }
    }
}

/// Volume attachment tickets as reported by the storage layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttachmentTickets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

/// Pod entry on a VM record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub vmi: String,
    pub node_id: String,
    pub status: String,
}

/// Everything known about one virtual machine
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmRecord {
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printable_status: Option<String>,
    #[serde(rename = "vmStatus", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "vmStatusReason", skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_claims: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    /// Bound persistent volume name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_robustness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_tickets: Option<AttachmentTickets>,
    /// Pod mounting the claim, used when no instance is available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,

    pub replicas: Vec<Replica>,
    pub engines: Vec<Engine>,
    pub pods: Vec<PodRecord>,
    pub instances: Vec<Instance>,
    pub migrations: Vec<Migration>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RecordError>,
}

impl VmRecord {
    /// Start a record from parsed metadata
    pub fn from_metadata(meta: &VmMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            namespace: meta.namespace.clone(),
            printable_status: meta.printable_status.clone(),
            status: meta.status.clone(),
            status_reason: meta.status_reason.clone(),
            image_id: meta.image_id.clone(),
            finalizers: meta.finalizers.clone(),
            removed_claims: meta.removed_claims.clone(),
            claim_name: meta.claim_name.clone(),
            storage_class: meta.storage_class.clone(),
            ..Default::default()
        }
    }

    pub fn push_error(&mut self, error: RecordError) {
        self.errors.push(error);
    }
}

/// A node with both storage and compute views
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub longhorn_info: StorageNode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_info: Option<ComputeNode>,
    pub running_pods: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<NodeHealth>,
}

/// The full aggregate produced by one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub vms: Vec<VmRecord>,
    pub nodes: Vec<NodeRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_info: Option<UpgradeInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_checks: Option<HealthSummary>,
}
