//! Finding a reachable address for a node other than the login node.
//!
//! The login address sits on some interface of the login node; its network
//! is taken as the segment the client can reach. The target node is then
//! expected to carry an address in that same network. This is a best-effort
//! heuristic for clusters whose nodes share a flat management network per
//! segment, not a routing guarantee.

use crate::{
    auth::application::service::login_service::LoginService,
    core::{
        domain::{
            error::NetworkResolutionError,
            model::{
                cluster_credentials::ClusterCredentials, network_interface::NetworkInterface,
                proxmox_auth::ProxmoxAuth,
            },
            value_object::ProxmoxHost,
        },
        infrastructure::api_client::ApiClient,
    },
};
use ipnet::IpNet;
use std::net::IpAddr;
use tracing::info;

pub struct NetworkResolver {
    api_client: ApiClient,
    login: LoginService,
}

impl NetworkResolver {
    pub fn new(api_client: ApiClient) -> Self {
        Self {
            login: LoginService::new(api_client.clone()),
            api_client,
        }
    }

    /// Resolves the address to use for `target_node`.
    ///
    /// Returns credentials whose node name is `target_node` and whose address
    /// is the first address of `target_node`, in API listing order, inside
    /// the login address's network. Never falls back to the login address.
    pub async fn resolve_reachable_address(
        &self,
        original_auth: &ProxmoxAuth,
        original_credentials: &ClusterCredentials,
        target_node: &str,
    ) -> Result<ClusterCredentials, NetworkResolutionError> {
        let login_node = original_credentials.login_node_name();
        let login_address = original_credentials.login_node_address();

        let login_interfaces = self.fetch_interfaces(original_auth, login_node).await?;
        let network = reference_network(&login_interfaces, login_address).ok_or_else(|| {
            NetworkResolutionError::NoReferenceInterface {
                node: login_node.to_string(),
                address: login_address.to_string(),
            }
        })??;

        let target_credentials =
            original_credentials.with_node(target_node, login_address.clone());
        let target_auth = self.login.authenticate(&target_credentials).await?;

        let target_interfaces = self.fetch_interfaces(&target_auth, target_node).await?;
        let address = select_address(&target_interfaces, &network).ok_or_else(|| {
            NetworkResolutionError::NoMatchingAddress {
                node: target_node.to_string(),
                network: network.to_string(),
            }
        })?;

        info!(node = target_node, %address, %network, "resolved node address");
        Ok(original_credentials.with_node(
            target_node,
            ProxmoxHost::new_unchecked(address.to_string()),
        ))
    }

    async fn fetch_interfaces(
        &self,
        auth: &ProxmoxAuth,
        node: &str,
    ) -> Result<Vec<NetworkInterface>, NetworkResolutionError> {
        let response = self
            .api_client
            .get(auth, &format!("nodes/{}/network", node))
            .await?;
        if !response.is_ok() {
            return Err(NetworkResolutionError::UnexpectedStatus {
                node: node.to_string(),
                status: response.status().as_u16(),
                message: response.message(),
            });
        }
        Ok(response.data()?)
    }
}

/// The network of the interface that carries `address`.
///
/// `None` if no interface carries it; `Some(Err)` if that interface's
/// prefix cannot be parsed.
pub fn reference_network(
    interfaces: &[NetworkInterface],
    address: &ProxmoxHost,
) -> Option<Result<IpNet, NetworkResolutionError>> {
    let wanted = address.as_ip();
    interfaces.iter().find_map(|iface| {
        iface
            .addresses()
            .find(|(candidate, _)| match (candidate.parse::<IpAddr>().ok(), wanted) {
                (Some(ip), Some(wanted)) => ip == wanted,
                _ => *candidate == address.as_str(),
            })
            .map(|(candidate, cidr)| interface_network(iface, candidate, cidr))
    })
}

fn interface_network(
    iface: &NetworkInterface,
    address: &str,
    cidr: Option<&str>,
) -> Result<IpNet, NetworkResolutionError> {
    let invalid = |cidr: &str| NetworkResolutionError::InvalidCidr {
        iface: iface.iface.clone(),
        cidr: cidr.to_string(),
    };

    if let Some(cidr) = cidr {
        return cidr
            .parse::<IpNet>()
            .map(|net| net.trunc())
            .map_err(|_| invalid(cidr));
    }

    // Older nodes only report address + netmask.
    let netmask = iface.netmask.as_deref().ok_or_else(|| invalid(""))?;
    let ip: IpAddr = address.parse().map_err(|_| invalid(address))?;
    let net = match netmask.parse::<u8>() {
        Ok(prefix) => IpNet::new(ip, prefix).map_err(|_| invalid(netmask))?,
        Err(_) => {
            let mask: IpAddr = netmask.parse().map_err(|_| invalid(netmask))?;
            IpNet::with_netmask(ip, mask).map_err(|_| invalid(netmask))?
        }
    };
    Ok(net.trunc())
}

/// First address, in interface order, that lies inside `network`.
pub fn select_address(interfaces: &[NetworkInterface], network: &IpNet) -> Option<IpAddr> {
    interfaces.iter().find_map(|iface| {
        iface
            .addresses()
            .filter_map(|(address, _)| address.parse::<IpAddr>().ok())
            .find(|ip| network.contains(ip))
    })
}
