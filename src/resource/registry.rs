//! Resource Registry
//!
//! Every collection the engine reads, with the API group path, plural name and
//! scope needed to build a request for it, plus the request type itself.

use std::fmt;

/// Static description of one resource collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDef {
    /// Short key used as the cache id prefix
    pub key: &'static str,
    /// API group path, e.g. `apis/kubevirt.io/v1`
    pub api_path: &'static str,
    /// Plural resource name used in URLs
    pub plural: &'static str,
    /// Whether the resource lives inside a namespace
    pub namespaced: bool,
}

/// Resource collections known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    VirtualMachine,
    VirtualMachineInstance,
    VirtualMachineInstanceMigration,
    PersistentVolumeClaim,
    PersistentVolume,
    Pod,
    Node,
    StorageVolume,
    StorageReplica,
    StorageEngine,
    StorageNode,
    VolumeAttachment,
    Upgrade,
}

const KUBEVIRT: &str = "apis/kubevirt.io/v1";
const CORE: &str = "api/v1";
const LONGHORN: &str = "apis/longhorn.io/v1beta2";
const HARVESTER: &str = "apis/harvesterhci.io/v1beta1";

/// Namespace the storage layer keeps its custom resources in.
pub const DEFAULT_STORAGE_NAMESPACE: &str = "longhorn-system";

/// Namespace holding cluster upgrade objects.
pub const UPGRADE_NAMESPACE: &str = "harvester-system";

impl ResourceKind {
    /// All kinds, in registry order
    pub const ALL: [ResourceKind; 13] = [
        ResourceKind::VirtualMachine,
        ResourceKind::VirtualMachineInstance,
        ResourceKind::VirtualMachineInstanceMigration,
        ResourceKind::PersistentVolumeClaim,
        ResourceKind::PersistentVolume,
        ResourceKind::Pod,
        ResourceKind::Node,
        ResourceKind::StorageVolume,
        ResourceKind::StorageReplica,
        ResourceKind::StorageEngine,
        ResourceKind::StorageNode,
        ResourceKind::VolumeAttachment,
        ResourceKind::Upgrade,
    ];

    pub const fn def(self) -> ResourceDef {
        match self {
            ResourceKind::VirtualMachine => ResourceDef {
                key: "vm",
                api_path: KUBEVIRT,
                plural: "virtualmachines",
                namespaced: true,
            },
            ResourceKind::VirtualMachineInstance => ResourceDef {
                key: "vmi",
                api_path: KUBEVIRT,
                plural: "virtualmachineinstances",
                namespaced: true,
            },
            ResourceKind::VirtualMachineInstanceMigration => ResourceDef {
                key: "vmim",
                api_path: KUBEVIRT,
                plural: "virtualmachineinstancemigrations",
                namespaced: true,
            },
            ResourceKind::PersistentVolumeClaim => ResourceDef {
                key: "pvc",
                api_path: CORE,
                plural: "persistentvolumeclaims",
                namespaced: true,
            },
            ResourceKind::PersistentVolume => ResourceDef {
                key: "pv",
                api_path: CORE,
                plural: "persistentvolumes",
                namespaced: false,
            },
            ResourceKind::Pod => ResourceDef {
                key: "pod",
                api_path: CORE,
                plural: "pods",
                namespaced: true,
            },
            ResourceKind::Node => ResourceDef {
                key: "node",
                api_path: CORE,
                plural: "nodes",
                namespaced: false,
            },
            ResourceKind::StorageVolume => ResourceDef {
                key: "lhvolume",
                api_path: LONGHORN,
                plural: "volumes",
                namespaced: true,
            },
            ResourceKind::StorageReplica => ResourceDef {
                key: "lhreplica",
                api_path: LONGHORN,
                plural: "replicas",
                namespaced: true,
            },
            ResourceKind::StorageEngine => ResourceDef {
                key: "lhengine",
                api_path: LONGHORN,
                plural: "engines",
                namespaced: true,
            },
            ResourceKind::StorageNode => ResourceDef {
                key: "lhnode",
                api_path: LONGHORN,
                plural: "nodes",
                namespaced: true,
            },
            ResourceKind::VolumeAttachment => ResourceDef {
                key: "lhva",
                api_path: LONGHORN,
                plural: "volumeattachments",
                namespaced: true,
            },
            ResourceKind::Upgrade => ResourceDef {
                key: "upgrade",
                api_path: HARVESTER,
                plural: "upgrades",
                namespaced: true,
            },
        }
    }

    pub fn key(self) -> &'static str {
        self.def().key
    }

    pub fn plural(self) -> &'static str {
        self.def().plural
    }
}

/// Look up a kind by its short key (`pvc`, `lhreplica`, ...)
pub fn get_resource(key: &str) -> Option<ResourceKind> {
    ResourceKind::ALL.into_iter().find(|kind| kind.key() == key)
}

/// Description of one read against the API server.
///
/// `id` doubles as the cache key and as the key of the matching result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub id: String,
    /// API group path, e.g. `api/v1`
    pub path: String,
    pub namespace: Option<String>,
    /// Plural resource name
    pub kind: String,
    /// Absent for list requests
    pub name: Option<String>,
}

impl FetchRequest {
    /// Request a single named object.
    pub fn get(kind: ResourceKind, namespace: Option<&str>, name: &str) -> Self {
        let def = kind.def();
        let namespace = namespace.filter(|_| def.namespaced);
        let id = match namespace {
            Some(ns) => format!("{}/{}/{}", def.key, ns, name),
            None => format!("{}/{}", def.key, name),
        };

        Self {
            id,
            path: def.api_path.to_string(),
            namespace: namespace.map(str::to_string),
            kind: def.plural.to_string(),
            name: Some(name.to_string()),
        }
    }

    /// Request the whole collection, optionally limited to one namespace.
    pub fn list(kind: ResourceKind, namespace: Option<&str>) -> Self {
        let def = kind.def();
        let namespace = namespace.filter(|_| def.namespaced);
        let id = match namespace {
            Some(ns) => format!("{}/{}/*", def.key, ns),
            None => format!("{}/*", def.key),
        };

        Self {
            id,
            path: def.api_path.to_string(),
            namespace: namespace.map(str::to_string),
            kind: def.plural.to_string(),
            name: None,
        }
    }

    pub fn is_list(&self) -> bool {
        self.name.is_none()
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ns) = &self.namespace {
            write!(f, "/{ns}")?;
        }
        if let Some(name) = &self.name {
            write!(f, "/{name}")?;
        }
        Ok(())
    }
}
