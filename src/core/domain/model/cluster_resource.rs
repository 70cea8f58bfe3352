//! Domain model for cluster-wide resources.
//!
//! This module defines the records returned by the `/cluster/resources` endpoint.
//! The response is a heterogeneous list (VMs, containers, storage, nodes, pools),
//! distinguished by the `type` field. Only QEMU entries matter for sessions, so
//! the record is kept flat and the type is checked with [`ClusterResource::is_qemu`].

use serde::{Deserialize, Serialize};

/// A resource discovered in the Proxmox cluster.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClusterResource {
    /// Composite identifier (e.g., `qemu/100`, `storage/pve1/local`).
    pub id: String,
    /// Resource type (e.g., `qemu`, `lxc`, `storage`, `node`).
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Human-readable name (may be absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The node this resource lives on (absent for cluster-wide entries like pools).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// Resource status (e.g., `running`, `stopped`, `available`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// `1` if the VM is a template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<u8>,
    /// Resource pool membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

impl ClusterResource {
    /// Returns true for QEMU virtual machines (templates included).
    #[must_use]
    pub fn is_qemu(&self) -> bool {
        self.resource_type == "qemu"
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status.as_deref() == Some("running")
    }
}
