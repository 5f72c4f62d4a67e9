//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use vmsnap::error::FetchError;
use vmsnap::resource::{FetchRequest, ResourceClient};

/// In-memory API keyed by request id. Unknown ids are reported as not found.
#[derive(Default)]
pub struct MemoryClient {
    objects: HashMap<String, Value>,
    failures: HashMap<String, FetchError>,
    requests: Mutex<Vec<String>>,
    delay: Duration,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, value: Value) -> Self {
        self.objects.insert(id.to_string(), value);
        self
    }

    pub fn failing(mut self, id: &str, error: FetchError) -> Self {
        self.failures.insert(id.to_string(), error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Ids requested so far, in dispatch order
    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, id: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| *r == id).count()
    }
}

#[async_trait]
impl ResourceClient for MemoryClient {
    async fn get(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        self.requests.lock().unwrap().push(request.id.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(error) = self.failures.get(&request.id) {
            return Err(error.clone());
        }
        self.objects
            .get(&request.id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                resource: request.to_string(),
            })
    }
}

pub fn list(items: Vec<Value>) -> Value {
    json!({"kind": "List", "metadata": {"resourceVersion": "1"}, "items": items})
}

/// VM whose storage claim comes from the claim template annotation
pub fn vm(name: &str, status: &str, claim: Option<&str>) -> Value {
    let ready = if status == "Running" { "True" } else { "False" };
    let mut obj = json!({
        "metadata": {"name": name, "namespace": "default", "finalizers": ["harvesterhci.io/VMController.UnsetOwnerOfPVCs"]},
        "spec": {"template": {"spec": {"volumes": []}}},
        "status": {
            "printableStatus": status,
            "conditions": [{"type": "Ready", "status": ready}]
        }
    });
    if let Some(claim) = claim {
        let templates = json!([{
            "metadata": {"name": claim, "annotations": {"harvesterhci.io/imageId": "default/image-x"}},
            "spec": {"storageClassName": "longhorn-image-x"}
        }]);
        obj["metadata"]["annotations"] = json!({
            "harvesterhci.io/volumeClaimTemplates": templates.to_string()
        });
    }
    obj
}

pub fn claim(name: &str, volume: &str) -> Value {
    json!({
        "metadata": {"name": name, "namespace": "default"},
        "spec": {"volumeName": volume},
        "status": {"phase": "Bound"}
    })
}

pub fn persistent_volume(name: &str) -> Value {
    json!({
        "metadata": {"name": name},
        "spec": {
            "storageClassName": "longhorn-image-x",
            "capacity": {"storage": "10Gi"},
            "accessModes": ["ReadWriteMany"],
            "csi": {"driver": "driver.longhorn.io", "volumeHandle": name}
        }
    })
}

pub fn storage_volume(name: &str, robustness: &str) -> Value {
    json!({
        "metadata": {"name": name, "namespace": "longhorn-system"},
        "status": {"robustness": robustness, "state": "attached", "currentNodeID": "n1"}
    })
}

pub fn replica(name: &str, volume: &str, node: &str, state: &str) -> Value {
    json!({
        "metadata": {"name": name, "namespace": "longhorn-system"},
        "spec": {"nodeID": node, "volumeName": volume, "engineName": format!("{volume}-e-0"), "active": true},
        "status": {"currentState": state, "started": state == "running"}
    })
}

pub fn engine(volume: &str) -> Value {
    json!({
        "metadata": {"name": format!("{volume}-e-0"), "namespace": "longhorn-system"},
        "spec": {"volumeName": volume, "nodeID": "n1", "active": true},
        "status": {"currentState": "running", "started": true}
    })
}

pub fn storage_node(name: &str) -> Value {
    json!({
        "metadata": {"name": name, "namespace": "longhorn-system"},
        "status": {"conditions": [{"type": "Ready", "status": "True"}], "diskStatus": {}}
    })
}

pub fn compute_node(name: &str) -> Value {
    json!({
        "metadata": {"name": name, "labels": {"node-role.kubernetes.io/control-plane": "true"}},
        "spec": {},
        "status": {
            "addresses": [{"type": "InternalIP", "address": "10.0.0.11"}],
            "conditions": [{"type": "Ready", "status": "True"}]
        }
    })
}

pub fn instance(name: &str, active_pods: Value) -> Value {
    json!({
        "metadata": {"name": name, "namespace": "default"},
        "status": {"phase": "Running", "nodeName": "n1", "activePods": active_pods}
    })
}

pub fn pod(name: &str, uid: &str, node: &str, claim: Option<&str>) -> Value {
    let volumes = match claim {
        Some(claim) => json!([{"name": "disk-0", "persistentVolumeClaim": {"claimName": claim}}]),
        None => json!([]),
    };
    json!({
        "metadata": {"name": name, "namespace": "default", "uid": uid},
        "spec": {"nodeName": node, "volumes": volumes},
        "status": {"phase": "Running"}
    })
}

pub fn migration(name: &str, vmi: &str, target_pod: &str) -> Value {
    json!({
        "metadata": {"name": name, "namespace": "default"},
        "spec": {"vmiName": vmi},
        "status": {
            "phase": "Running",
            "migrationState": {"sourceNode": "n1", "targetNode": "n2", "targetPod": target_pod}
        }
    })
}

pub fn attachment(volume: &str) -> Value {
    json!({
        "metadata": {"name": volume, "namespace": "longhorn-system"},
        "spec": {"attachmentTickets": {"csi-abc": {"nodeID": "n1", "type": "csi-attacher"}}},
        "status": {"attachmentTicketStatuses": {"csi-abc": {"satisfied": true}}}
    })
}

/// A cluster with one running VM on a replicated volume and one stopped VM
/// without storage
pub fn cluster() -> MemoryClient {
    MemoryClient::new()
        .with(
            "vm/*",
            list(vec![vm("vm-1", "Running", Some("vm-1-disk-0")), vm("vm-2", "Stopped", None)]),
        )
        .with("pvc/default/vm-1-disk-0", claim("vm-1-disk-0", "pvc-abc"))
        .with("pv/pvc-abc", persistent_volume("pvc-abc"))
        .with("lhvolume/longhorn-system/*", list(vec![storage_volume("pvc-abc", "healthy")]))
        .with(
            "lhreplica/longhorn-system/*",
            list(vec![
                replica("pvc-abc-r-1", "pvc-abc", "n1", "running"),
                replica("pvc-abc-r-2", "pvc-abc", "n2", "running"),
                replica("pvc-abcd-r-1", "pvc-abcd", "n1", "running"),
            ]),
        )
        .with("lhengine/longhorn-system/*", list(vec![engine("pvc-abc")]))
        .with("lhnode/longhorn-system/*", list(vec![storage_node("n1"), storage_node("n2")]))
        .with("lhva/longhorn-system/pvc-abc", attachment("pvc-abc"))
        .with("vmi/default/vm-1", instance("vm-1", json!({"uid-1": "n1", "uid-gone": "n2"})))
        .with(
            "vmim/default/*",
            list(vec![
                migration("vm-1-migrate", "vm-1", "virt-launcher-vm-1-target"),
                migration("vm-10-migrate", "vm-10", "virt-launcher-vm-10-target"),
            ]),
        )
        .with(
            "pod/default/*",
            list(vec![pod("virt-launcher-vm-1-abcde", "uid-1", "n1", Some("vm-1-disk-0"))]),
        )
        .with(
            "pod/*",
            list(vec![pod("virt-launcher-vm-1-abcde", "uid-1", "n1", Some("vm-1-disk-0"))]),
        )
        .with("node/*", list(vec![compute_node("n1")]))
}
