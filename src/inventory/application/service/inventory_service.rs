//! Cluster inventory: listing resources and narrowing them to usable VMs.

use crate::core::{
    domain::{
        error::{InventoryError, MalformedIdError},
        model::{cluster_resource::ClusterResource, proxmox_auth::ProxmoxAuth, vm_handle::VmHandle},
        value_object::parse_vm_id,
    },
    infrastructure::api_client::ApiClient,
};
use tracing::info;

pub struct InventoryService {
    api_client: ApiClient,
}

impl InventoryService {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    /// Lists the QEMU virtual machines of the cluster (templates included).
    ///
    /// # Errors
    /// Returns `InventoryError` on transport failures, non-200 responses and
    /// bodies that are not a resource list.
    pub async fn list_vms(&self, auth: &ProxmoxAuth) -> Result<Vec<ClusterResource>, InventoryError> {
        let response = self.api_client.get(auth, "cluster/resources").await?;
        if !response.is_ok() {
            return Err(InventoryError::UnexpectedStatus {
                status: response.status().as_u16(),
                message: response.message(),
            });
        }

        let resources: Vec<ClusterResource> = response.data()?;
        let vms = filter_vms(resources);
        info!(count = vms.len(), "listed cluster VMs");
        Ok(vms)
    }
}

/// Keeps only QEMU virtual machines.
pub fn filter_vms(resources: Vec<ClusterResource>) -> Vec<ClusterResource> {
    resources.into_iter().filter(ClusterResource::is_qemu).collect()
}

/// Finds the resource whose id parses to exactly `numeric_id`.
///
/// Entries with malformed ids never match.
pub fn find_vm(resources: &[ClusterResource], numeric_id: u32) -> Option<&ClusterResource> {
    resources
        .iter()
        .find(|resource| parse_vm_id(&resource.id).is_ok_and(|id| id == numeric_id))
}

/// Converts every resource into a [`VmHandle`], failing on the first malformed id.
pub fn vm_handles(resources: &[ClusterResource]) -> Result<Vec<VmHandle>, MalformedIdError> {
    resources.iter().map(VmHandle::try_from).collect()
}
