//! Virtual machine instances

use super::fields::{optional_array, optional_decode, optional_str, optional_str_map, required_object, required_str};
use crate::error::ParseError;
use crate::model::{Instance, NetworkInterface};
use serde_json::Value;
use std::net::Ipv4Addr;

/// Parse an instance. Name and a status object are required; phase
/// defaults to `Unknown`.
pub fn parse_instance(obj: &Value) -> Result<Instance, ParseError> {
    let name = required_str(obj, "metadata.name")?.to_string();
    required_object(obj, "status")?;

    Ok(Instance {
        name,
        node_name: optional_str(obj, "status.nodeName"),
        phase: optional_str(obj, "status.phase").unwrap_or_else(|| "Unknown".to_string()),
        active_pods: optional_str_map(obj, "status.activePods"),
        guest_os_info: optional_decode(obj, "status.guestOSInfo"),
        memory_info: optional_decode(obj, "status.memory"),
        current_cpu_topology: optional_decode(obj, "status.currentCPUTopology"),
        cpu_domain: optional_decode(obj, "spec.domain.cpu"),
        interfaces: optional_array(obj, "status.interfaces")
            .iter()
            .filter_map(parse_interface)
            .collect(),
        migration_state: optional_decode(obj, "status.migrationState"),
    })
}

fn parse_interface(iface: &Value) -> Option<NetworkInterface> {
    let ip_address = optional_str(iface, "ipAddress").or_else(|| {
        optional_array(iface, "ipAddresses")
            .iter()
            .filter_map(Value::as_str)
            .find(|ip| ip.parse::<Ipv4Addr>().is_ok())
            .map(str::to_string)
    });

    let parsed = NetworkInterface {
        name: optional_str(iface, "name").unwrap_or_default(),
        interface_name: optional_str(iface, "interfaceName").unwrap_or_default(),
        ip_address: ip_address.unwrap_or_default(),
        mac: optional_str(iface, "mac").unwrap_or_default(),
    };

    if parsed.name.is_empty() && parsed.ip_address.is_empty() && parsed.mac.is_empty() {
        None
    } else {
        Some(parsed)
    }
}
