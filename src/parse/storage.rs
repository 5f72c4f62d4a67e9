//! Storage claims, persistent volumes and the block storage layer's volumes,
//! replicas and engines.

use super::fields::{
    optional_array, optional_bool, optional_decode, optional_i64, optional_str, optional_str_list,
    required_bool, required_non_empty_str, required_str,
};
use crate::error::ParseError;
use crate::model::{
    AttachmentTickets, ClaimInfo, Engine, PersistentVolumeInfo, Replica, ReplicaCondition, StorageVolume,
};
use crate::resource::fetcher::extract_json_value;
use serde_json::Value;

/// Parse a storage claim.
///
/// A claim without a bound volume still parses; binding is checked by
/// [`bound_volume_name`].
pub fn parse_claim(obj: &Value) -> Result<ClaimInfo, ParseError> {
    Ok(ClaimInfo {
        name: required_str(obj, "metadata.name")?.to_string(),
        namespace: required_str(obj, "metadata.namespace")?.to_string(),
        volume_name: optional_str(obj, "spec.volumeName"),
        phase: optional_str(obj, "status.phase"),
    })
}

/// Name of the persistent volume a claim is bound to
pub fn bound_volume_name(obj: &Value) -> Result<&str, ParseError> {
    required_non_empty_str(obj, "spec.volumeName")
}

pub fn parse_persistent_volume(obj: &Value) -> Result<PersistentVolumeInfo, ParseError> {
    Ok(PersistentVolumeInfo {
        name: required_str(obj, "metadata.name")?.to_string(),
        storage_class: optional_str(obj, "spec.storageClassName"),
        capacity: optional_str(obj, "spec.capacity.storage"),
        access_modes: optional_str_list(obj, "spec.accessModes"),
        csi_driver: optional_str(obj, "spec.csi.driver"),
        volume_handle: optional_str(obj, "spec.csi.volumeHandle"),
    })
}

pub fn parse_storage_volume(obj: &Value) -> Result<StorageVolume, ParseError> {
    Ok(StorageVolume {
        name: required_str(obj, "metadata.name")?.to_string(),
        robustness: optional_str(obj, "status.robustness"),
        state: optional_str(obj, "status.state"),
        node_id: optional_str(obj, "status.currentNodeID"),
    })
}

/// Parse a replica. Name, node assignment, volume, engine and the active
/// flag are required.
pub fn parse_replica(obj: &Value) -> Result<Replica, ParseError> {
    let conditions = optional_array(obj, "status.conditions")
        .iter()
        .filter_map(|c| {
            Some(ReplicaCondition {
                condition_type: optional_str(c, "type")?,
                status: optional_str(c, "status").unwrap_or_default(),
            })
        })
        .collect();

    Ok(Replica {
        name: required_str(obj, "metadata.name")?.to_string(),
        node_id: required_str(obj, "spec.nodeID")?.to_string(),
        volume_name: required_str(obj, "spec.volumeName")?.to_string(),
        engine_name: required_str(obj, "spec.engineName")?.to_string(),
        active: required_bool(obj, "spec.active")?,
        current_state: optional_str(obj, "status.currentState"),
        started: optional_bool(obj, "status.started").unwrap_or(false),
        data_engine: optional_str(obj, "spec.dataEngine"),
        disk_id: optional_str(obj, "spec.diskID"),
        instance_manager: optional_str(obj, "status.instanceManagerName"),
        image: optional_str(obj, "status.currentImage").or_else(|| optional_str(obj, "spec.image")),
        owner_ref_name: optional_array(obj, "metadata.ownerReferences")
            .first()
            .and_then(|owner| optional_str(owner, "name")),
        conditions,
        storage_ip: optional_str(obj, "status.storageIP"),
        ip: optional_str(obj, "status.ip"),
        port: optional_i64(obj, "status.port"),
    })
}

/// Parse an engine. Only name and volume are required; state defaults to
/// `unknown`.
pub fn parse_engine(obj: &Value) -> Result<Engine, ParseError> {
    Ok(Engine {
        name: required_str(obj, "metadata.name")?.to_string(),
        volume_name: required_str(obj, "spec.volumeName")?.to_string(),
        active: optional_bool(obj, "spec.active").unwrap_or(false),
        current_state: optional_str(obj, "status.currentState").unwrap_or_else(|| "unknown".to_string()),
        started: optional_bool(obj, "status.started").unwrap_or(false),
        node_id: optional_str(obj, "spec.nodeID"),
        snapshots: optional_decode(obj, "status.snapshots").unwrap_or_default(),
    })
}

/// Attachment tickets of a volume attachment object, kept as raw JSON
pub fn parse_attachment_tickets(obj: &Value) -> AttachmentTickets {
    AttachmentTickets {
        status: extract_json_value(obj, "status.attachmentTicketStatuses").cloned(),
        spec: extract_json_value(obj, "spec.attachmentTickets").cloned(),
    }
}

/// Items of a list whose `spec.volumeName` equals `volume` exactly
pub fn items_for_volume<'a>(items: &'a [Value], volume: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    items
        .iter()
        .filter(move |item| optional_str(item, "spec.volumeName").as_deref() == Some(volume))
}

/// Parse every item of `volume`, keeping the items that fail next to the ones that parse
fn partition_for_volume<T>(
    items: &[Value],
    volume: &str,
    parse: fn(&Value) -> Result<T, ParseError>,
) -> (Vec<T>, Vec<ParseError>) {
    let mut parsed = Vec::new();
    let mut failed = Vec::new();
    for item in items_for_volume(items, volume) {
        match parse(item) {
            Ok(member) => parsed.push(member),
            Err(e) => failed.push(e),
        }
    }
    (parsed, failed)
}

/// Replicas of `volume`, and the matching replicas that failed to parse
pub fn replicas_for_volume(items: &[Value], volume: &str) -> (Vec<Replica>, Vec<ParseError>) {
    partition_for_volume(items, volume, parse_replica)
}

/// Engines of `volume`, and the matching engines that failed to parse
pub fn engines_for_volume(items: &[Value], volume: &str) -> (Vec<Engine>, Vec<ParseError>) {
    partition_for_volume(items, volume, parse_engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn replica(name: &str, volume: &str, node: &str, state: &str) -> Value {
        json!({
            "metadata": {
                "name": name,
                "namespace": "longhorn-system",
                "ownerReferences": [{"kind": "Volume", "name": volume}]
            },
            "spec": {
                "nodeID": node,
                "volumeName": volume,
                "engineName": format!("{volume}-e-0"),
                "active": true,
                "dataEngine": "v1",
                "diskID": "disk-1"
            },
            "status": {"currentState": state, "started": state == "running", "port": 10000}
        })
    }

    #[test]
    fn test_parse_bound_claim() {
        let obj = json!({
            "metadata": {"name": "disk-0", "namespace": "default"},
            "spec": {"volumeName": "pvc-abc"},
            "status": {"phase": "Bound"}
        });

        let claim = parse_claim(&obj).unwrap();
        assert_eq!(claim.volume_name.as_deref(), Some("pvc-abc"));
        assert_eq!(claim.phase.as_deref(), Some("Bound"));
        assert_eq!(bound_volume_name(&obj), Ok("pvc-abc"));
    }

    #[test]
    fn test_unbound_claim() {
        let obj = json!({
            "metadata": {"name": "disk-0", "namespace": "default"},
            "spec": {"volumeName": ""},
            "status": {"phase": "Pending"}
        });

        assert_eq!(parse_claim(&obj).unwrap().volume_name, None);
        assert_eq!(
            bound_volume_name(&obj),
            Err(ParseError::MissingField("spec.volumeName".to_string()))
        );
    }

    #[test]
    fn test_parse_persistent_volume() {
        let obj = json!({
            "metadata": {"name": "pvc-abc"},
            "spec": {
                "storageClassName": "harvester-longhorn",
                "capacity": {"storage": "10Gi"},
                "accessModes": ["ReadWriteMany"],
                "csi": {"driver": "driver.longhorn.io", "volumeHandle": "pvc-abc"}
            }
        });

        let pv = parse_persistent_volume(&obj).unwrap();
        assert_eq!(pv.capacity.as_deref(), Some("10Gi"));
        assert_eq!(pv.access_modes, vec!["ReadWriteMany"]);
        assert_eq!(pv.volume_handle.as_deref(), Some("pvc-abc"));
        assert!(pv.is_longhorn());
    }

    #[test]
    fn test_parse_replica() {
        let parsed = parse_replica(&replica("r-1", "pvc-abc", "n1", "running")).unwrap();

        assert_eq!(parsed.node_id, "n1");
        assert_eq!(parsed.engine_name, "pvc-abc-e-0");
        assert!(parsed.active);
        assert!(parsed.started);
        assert_eq!(parsed.owner_ref_name.as_deref(), Some("pvc-abc"));
        assert_eq!(parsed.port, Some(10000));
        assert_eq!(parsed.image, None);
    }

    #[test]
    fn test_replica_requires_node() {
        let mut obj = replica("r-1", "pvc-abc", "n1", "running");
        obj["spec"].as_object_mut().unwrap().remove("nodeID");

        assert_eq!(
            parse_replica(&obj),
            Err(ParseError::MissingField("spec.nodeID".to_string()))
        );
    }

    #[test]
    fn test_replica_active_must_be_bool() {
        let mut obj = replica("r-1", "pvc-abc", "n1", "running");
        obj["spec"]["active"] = json!("yes");

        assert!(matches!(
            parse_replica(&obj),
            Err(ParseError::TypeMismatch { expected: "boolean", .. })
        ));
    }

    #[test]
    fn test_engine_defaults() {
        let obj = json!({
            "metadata": {"name": "pvc-abc-e-0"},
            "spec": {"volumeName": "pvc-abc"}
        });

        let engine = parse_engine(&obj).unwrap();
        assert_eq!(engine.current_state, "unknown");
        assert!(!engine.active);
        assert!(engine.snapshots.is_empty());
    }

    #[test]
    fn test_engine_snapshots() {
        let obj = json!({
            "metadata": {"name": "pvc-abc-e-0"},
            "spec": {"volumeName": "pvc-abc", "active": true, "nodeID": "n1"},
            "status": {
                "currentState": "running",
                "started": true,
                "snapshots": {
                    "volume-head": {"name": "volume-head", "parent": "snap-1", "usercreated": false},
                    "snap-1": {"name": "snap-1", "size": "1024", "usercreated": true}
                }
            }
        });

        let engine = parse_engine(&obj).unwrap();
        assert_eq!(engine.snapshots.len(), 2);
        assert!(engine.snapshots["snap-1"].user_created);
        assert_eq!(engine.node_id.as_deref(), Some("n1"));
    }

    #[test]
    fn test_attachment_tickets() {
        let obj = json!({
            "metadata": {"name": "pvc-abc"},
            "spec": {"attachmentTickets": {"csi-abc": {"nodeID": "n1", "type": "csi-attacher"}}},
            "status": {"attachmentTicketStatuses": {"csi-abc": {"satisfied": true}}}
        });

        let tickets = parse_attachment_tickets(&obj);
        assert_eq!(tickets.status.unwrap()["csi-abc"]["satisfied"], true);
        assert_eq!(tickets.spec.unwrap()["csi-abc"]["nodeID"], "n1");
        assert_eq!(parse_attachment_tickets(&json!({})), AttachmentTickets::default());
    }

    #[test]
    fn test_volume_matching_is_exact() {
        let items = vec![
            replica("r-1", "pvc-abc", "n1", "running"),
            replica("r-2", "pvc-abc", "n2", "running"),
            replica("r-3", "pvc-abc", "n3", "faulted"),
            replica("r-4", "pvc-xyz", "n1", "running"),
            replica("r-5", "pvc-abcd", "n2", "running"),
        ];

        let (found, failed) = replicas_for_volume(&items, "pvc-abc");
        let mut names: Vec<_> = found.iter().map(|r| r.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["r-1", "r-2", "r-3"]);
        assert!(failed.is_empty());
    }

    #[test]
    fn test_unparseable_members_are_returned() {
        let items = vec![
            json!({"metadata": {"name": "e-0"}, "spec": {"volumeName": "pvc-abc"}}),
            json!({"metadata": {}, "spec": {"volumeName": "pvc-abc"}}),
            json!({"metadata": {}, "spec": {"volumeName": "pvc-xyz"}}),
        ];

        let (engines, failed) = engines_for_volume(&items, "pvc-abc");
        assert_eq!(engines.len(), 1);
        assert_eq!(failed, vec![ParseError::MissingField("metadata.name".to_string())]);

        let mut broken = replica("r-2", "pvc-abc", "n2", "running");
        broken["spec"].as_object_mut().unwrap().remove("nodeID");
        let items = vec![replica("r-1", "pvc-abc", "n1", "running"), broken];
        let (replicas, failed) = replicas_for_volume(&items, "pvc-abc");
        assert_eq!(replicas.len(), 1);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].field(), "spec.nodeID");
    }
}
