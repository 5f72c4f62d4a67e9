//! Instance migrations

use super::fields::{optional_array, optional_decode, optional_str, optional_str_map, required_str};
use crate::error::ParseError;
use crate::model::{Migration, PhaseTransition};
use serde_json::Value;

pub const VMI_NAME_LABEL: &str = "kubevirt.io/vmiName";

/// Parse a migration. Name and namespace are required.
pub fn parse_migration(obj: &Value) -> Result<Migration, ParseError> {
    let phase_transitions: Vec<PhaseTransition> = optional_array(obj, "status.phaseTransitionTimestamps")
        .iter()
        .map(|t| PhaseTransition {
            phase: optional_str(t, "phase").unwrap_or_default(),
            timestamp: optional_str(t, "phaseTransitionTimestamp").unwrap_or_default(),
        })
        .collect();

    Ok(Migration {
        name: required_str(obj, "metadata.name")?.to_string(),
        namespace: required_str(obj, "metadata.namespace")?.to_string(),
        vmi_name: optional_str(obj, "spec.vmiName"),
        phase: optional_str(obj, "status.phase"),
        latest_phase_transition: phase_transitions.last().cloned(),
        phase_transitions,
        state: optional_decode(obj, "status.migrationState"),
        target_pod_exists: None,
        target_pod_status: None,
    })
}

/// Whether a migration object concerns the named instance.
///
/// Evacuation migrations may carry the instance name only in a label or in
/// their status, so all three places are checked. Matching is exact.
pub fn targets_instance(obj: &Value, instance: &str) -> bool {
    optional_str(obj, "spec.vmiName").as_deref() == Some(instance)
        || optional_str_map(obj, "metadata.labels")
            .get(VMI_NAME_LABEL)
            .is_some_and(|label| label == instance)
        || optional_str(obj, "status.vmiName").as_deref() == Some(instance)
}

/// Parse every migration in `items` that targets `instance`, skipping
/// unparseable entries
pub fn migrations_for_instance(items: &[Value], instance: &str) -> Vec<Migration> {
    items
        .iter()
        .filter(|item| targets_instance(item, instance))
        .filter_map(|item| match parse_migration(item) {
            Ok(migration) => Some(migration),
            Err(e) => {
                tracing::debug!("Skipping migration of {}: {}", instance, e);
                None
            }
        })
        .collect()
}
