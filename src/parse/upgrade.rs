//! Cluster upgrade status

use super::fields::{optional_array, optional_str, optional_str_map};
use crate::model::UpgradeInfo;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

pub const UPGRADE_STATE_LABEL: &str = "harvesterhci.io/upgradeState";

fn created_at(obj: &Value) -> Option<DateTime<Utc>> {
    let raw = optional_str(obj, "metadata.creationTimestamp")?;
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Pick the most recently created upgrade from a list and summarize it.
///
/// Items without a parseable creation timestamp are ignored.
pub fn latest_upgrade(items: &[Value]) -> Option<UpgradeInfo> {
    let (created, latest) = items
        .iter()
        .filter_map(|item| Some((created_at(item)?, item)))
        .max_by_key(|(created, _)| *created)?;

    Some(parse_upgrade(latest, created))
}

fn parse_upgrade(obj: &Value, created: DateTime<Utc>) -> UpgradeInfo {
    let node_statuses: BTreeMap<String, String> = obj
        .pointer("/status/nodeStatuses")
        .and_then(Value::as_object)
        .map(|statuses| {
            statuses
                .iter()
                .filter_map(|(node, status)| Some((node.clone(), optional_str(status, "state")?)))
                .collect()
        })
        .unwrap_or_default();

    let state = optional_str_map(obj, "metadata.labels")
        .remove(UPGRADE_STATE_LABEL)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state_from_conditions(optional_array(obj, "status.conditions")));

    UpgradeInfo {
        version: optional_str(obj, "spec.version").unwrap_or_default(),
        previous_version: optional_str(obj, "status.previousVersion").unwrap_or_default(),
        upgrade_time: Some(created),
        state,
        node_statuses,
    }
}

fn state_from_conditions(conditions: &[Value]) -> String {
    if conditions.is_empty() {
        return "Unknown".to_string();
    }

    let all_true = conditions
        .iter()
        .all(|c| optional_str(c, "status").as_deref() == Some("True"));

    if all_true { "Succeeded" } else { "Failed" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upgrade(name: &str, created: &str, version: &str) -> Value {
        json!({
            "metadata": {"name": name, "creationTimestamp": created},
            "spec": {"version": version},
            "status": {
                "previousVersion": "v1.3.2",
                "nodeStatuses": {"n1": {"state": "Succeeded"}, "n2": {"state": "Upgrading"}}
            }
        })
    }

    #[test]
    fn test_latest_by_creation_time() {
        let items = vec![
            upgrade("hvst-upgrade-a", "2025-01-10T08:00:00Z", "v1.4.0"),
            upgrade("hvst-upgrade-b", "2025-06-02T08:00:00Z", "v1.4.1"),
            upgrade("hvst-upgrade-c", "not-a-time", "v9.9.9"),
        ];

        let info = latest_upgrade(&items).unwrap();
        assert_eq!(info.version, "v1.4.1");
        assert_eq!(info.previous_version, "v1.3.2");
        assert_eq!(info.node_statuses["n2"], "Upgrading");
        assert_eq!(info.state, "Unknown");
    }

    #[test]
    fn test_state_from_label() {
        let mut obj = upgrade("u", "2025-01-10T08:00:00Z", "v1.4.0");
        obj["metadata"]["labels"] = json!({"harvesterhci.io/upgradeState": "UpgradingNodes"});
        assert_eq!(latest_upgrade(&[obj]).unwrap().state, "UpgradingNodes");
    }

    #[test]
    fn test_state_from_conditions() {
        let mut obj = upgrade("u", "2025-01-10T08:00:00Z", "v1.4.0");
        obj["status"]["conditions"] = json!([
            {"type": "ImageReady", "status": "True"},
            {"type": "Completed", "status": "True"}
        ]);
        assert_eq!(latest_upgrade(&[obj.clone()]).unwrap().state, "Succeeded");

        obj["status"]["conditions"][1]["status"] = json!("False");
        assert_eq!(latest_upgrade(&[obj]).unwrap().state, "Failed");
    }

    #[test]
    fn test_no_upgrades() {
        assert!(latest_upgrade(&[]).is_none());
    }
}
