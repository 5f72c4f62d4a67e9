//! Pods

use super::fields::{optional_array, optional_str, required_str};
use crate::error::ParseError;
use crate::model::Pod;
use serde_json::Value;

/// Parse a pod. Name, scheduled node and phase are required.
pub fn parse_pod(obj: &Value) -> Result<Pod, ParseError> {
    Ok(Pod {
        name: required_str(obj, "metadata.name")?.to_string(),
        uid: optional_str(obj, "metadata.uid"),
        node_name: required_str(obj, "spec.nodeName")?.to_string(),
        phase: required_str(obj, "status.phase")?.to_string(),
        owner_name: optional_array(obj, "metadata.ownerReferences")
            .first()
            .and_then(|owner| optional_str(owner, "name")),
        claim_names: optional_array(obj, "spec.volumes")
            .iter()
            .filter_map(|volume| optional_str(volume, "persistentVolumeClaim.claimName"))
            .collect(),
    })
}

/// Whether the pod counts towards a node's running workload
pub fn is_running(phase: &str) -> bool {
    matches!(phase, "Running" | "Succeeded")
}
