//! Domain model for node network configuration from the `/nodes/{node}/network` endpoint.

use serde::{Deserialize, Serialize};

/// One entry of a node's interface list.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkInterface {
    /// Interface name (e.g., `vmbr0`, `eno1`).
    pub iface: String,
    /// Interface type (e.g., `bridge`, `eth`, `bond`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// IPv4 address, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// IPv4 network in CIDR notation (e.g., `10.0.20.11/24`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    /// IPv4 netmask, either a prefix length (`24`) or dotted (`255.255.255.0`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
    /// IPv6 address, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address6: Option<String>,
    /// IPv6 network in CIDR notation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr6: Option<String>,
    /// `1` if the interface is up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<u8>,
}

impl NetworkInterface {
    /// `(address, cidr)` pairs configured on this interface, IPv4 first.
    /// Empty addresses are skipped.
    pub fn addresses(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        [
            (self.address.as_deref(), self.cidr.as_deref()),
            (self.address6.as_deref(), self.cidr6.as_deref()),
        ]
        .into_iter()
        .filter_map(|(address, cidr)| match address.map(str::trim) {
            Some(address) if !address.is_empty() => Some((address, cidr)),
            _ => None,
        })
    }
}
