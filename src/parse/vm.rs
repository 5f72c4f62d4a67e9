//! Virtual machine metadata

use super::fields::{optional_array, optional_str, optional_str_list, optional_str_map, required_str};
use crate::error::ParseError;
use crate::model::VmMetadata;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const CLAIM_TEMPLATES_ANNOTATION: &str = "harvesterhci.io/volumeClaimTemplates";
pub const REMOVED_CLAIMS_ANNOTATION: &str = "harvesterhci.io/removedPersistentVolumeClaims";
pub const IMAGE_ID_ANNOTATION: &str = "harvesterhci.io/imageId";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimTemplate {
    #[serde(default)]
    metadata: TemplateMetadata,
    #[serde(default)]
    spec: TemplateSpec,
}

#[derive(Debug, Default, Deserialize)]
struct TemplateMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateSpec {
    #[serde(default)]
    storage_class_name: Option<String>,
}

/// Parse a virtual machine object.
///
/// Name and namespace are required. The storage claim comes from the first
/// claim template annotation, else the first claim-backed volume in the
/// template spec.
pub fn parse_vm(obj: &Value) -> Result<VmMetadata, ParseError> {
    let name = required_str(obj, "metadata.name")?.to_string();
    let namespace = required_str(obj, "metadata.namespace")?.to_string();

    let annotations = optional_str_map(obj, "metadata.annotations");

    let mut meta = VmMetadata {
        name,
        namespace,
        finalizers: optional_str_list(obj, "metadata.finalizers"),
        removed_claims: annotations
            .get(REMOVED_CLAIMS_ANNOTATION)
            .filter(|s| !s.is_empty())
            .cloned(),
        printable_status: optional_str(obj, "status.printableStatus"),
        ..Default::default()
    };

    if let Some(template) = annotations
        .get(CLAIM_TEMPLATES_ANNOTATION)
        .and_then(|raw| first_claim_template(raw, &meta.name))
    {
        meta.claim_name = template.metadata.name.filter(|s| !s.is_empty());
        meta.image_id = template
            .metadata
            .annotations
            .get(IMAGE_ID_ANNOTATION)
            .filter(|s| !s.is_empty())
            .cloned();
        meta.storage_class = template.spec.storage_class_name.filter(|s| !s.is_empty());
    }

    if meta.claim_name.is_none() {
        meta.claim_name = optional_array(obj, "spec.template.spec.volumes")
            .iter()
            .find_map(|volume| optional_str(volume, "persistentVolumeClaim.claimName"));
    }

    if let Some(latest) = optional_array(obj, "status.conditions").last() {
        meta.status = optional_str(latest, "status");
        meta.status_reason = optional_str(latest, "reason");
    }

    Ok(meta)
}

fn first_claim_template(raw: &str, vm_name: &str) -> Option<ClaimTemplate> {
    match serde_json::from_str::<Vec<ClaimTemplate>>(raw) {
        Ok(templates) => templates.into_iter().next(),
        Err(e) => {
            tracing::debug!("Ignoring malformed claim templates on {}: {}", vm_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vm_with_templates() -> Value {
        let templates = json!([
            {
                "metadata": {
                    "name": "vm-1-disk-0-abcde",
                    "annotations": {"harvesterhci.io/imageId": "default/image-xyz"}
                },
                "spec": {"storageClassName": "longhorn-image-xyz"}
            },
            {"metadata": {"name": "vm-1-disk-1"}}
        ]);

        json!({
            "metadata": {
                "name": "vm-1",
                "namespace": "default",
                "finalizers": ["kubevirt.io/virtualMachineControllerFinalize"],
                "annotations": {
                    "harvesterhci.io/volumeClaimTemplates": templates.to_string(),
                    "harvesterhci.io/removedPersistentVolumeClaims": "old-disk"
                }
            },
            "spec": {"template": {"spec": {"volumes": [
                {"name": "cloudinit", "cloudInitNoCloud": {}},
                {"name": "disk-1", "persistentVolumeClaim": {"claimName": "other"}}
            ]}}},
            "status": {
                "printableStatus": "Running",
                "conditions": [
                    {"type": "Paused", "status": "False"},
                    {"type": "Ready", "status": "True", "reason": "AllGood"}
                ]
            }
        })
    }

    #[test]
    fn test_claim_from_first_template() {
        let meta = parse_vm(&vm_with_templates()).unwrap();

        assert_eq!(meta.name, "vm-1");
        assert_eq!(meta.namespace, "default");
        assert_eq!(meta.claim_name.as_deref(), Some("vm-1-disk-0-abcde"));
        assert_eq!(meta.image_id.as_deref(), Some("default/image-xyz"));
        assert_eq!(meta.storage_class.as_deref(), Some("longhorn-image-xyz"));
        assert_eq!(meta.removed_claims.as_deref(), Some("old-disk"));
        assert_eq!(meta.finalizers.len(), 1);
    }

    #[test]
    fn test_latest_condition_wins() {
        let meta = parse_vm(&vm_with_templates()).unwrap();
        assert_eq!(meta.printable_status.as_deref(), Some("Running"));
        assert_eq!(meta.status.as_deref(), Some("True"));
        assert_eq!(meta.status_reason.as_deref(), Some("AllGood"));
    }

    #[test]
    fn test_claim_falls_back_to_first_claim_volume() {
        let obj = json!({
            "metadata": {"name": "vm-2", "namespace": "prod"},
            "spec": {"template": {"spec": {"volumes": [
                {"name": "cloudinit", "cloudInitNoCloud": {}},
                {"name": "root", "persistentVolumeClaim": {"claimName": "vm-2-root"}},
                {"name": "data", "persistentVolumeClaim": {"claimName": "vm-2-data"}}
            ]}}}
        });

        let meta = parse_vm(&obj).unwrap();
        assert_eq!(meta.claim_name.as_deref(), Some("vm-2-root"));
        assert_eq!(meta.image_id, None);
    }

    #[test]
    fn test_malformed_template_annotation_falls_back() {
        let obj = json!({
            "metadata": {
                "name": "vm-3",
                "namespace": "default",
                "annotations": {"harvesterhci.io/volumeClaimTemplates": "not json"}
            },
            "spec": {"template": {"spec": {"volumes": [
                {"persistentVolumeClaim": {"claimName": "vm-3-root"}}
            ]}}}
        });

        assert_eq!(parse_vm(&obj).unwrap().claim_name.as_deref(), Some("vm-3-root"));
    }

    #[test]
    fn test_vm_without_storage() {
        let obj = json!({"metadata": {"name": "vm-4", "namespace": "default"}});
        let meta = parse_vm(&obj).unwrap();
        assert_eq!(meta.claim_name, None);
        assert_eq!(meta.status, None);
    }

    #[test]
    fn test_missing_namespace_is_an_error() {
        let obj = json!({"metadata": {"name": "vm-5"}});
        assert_eq!(
            parse_vm(&obj),
            Err(ParseError::MissingField("metadata.namespace".to_string()))
        );
    }
}
