use crate::core::domain::{
    error::MalformedIdError, model::cluster_resource::ClusterResource, value_object::parse_vm_id,
};

/// Working reference to a chosen VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmHandle {
    pub numeric_id: u32,
    pub node: String,
    pub name: String,
}

impl VmHandle {
    pub fn new(numeric_id: u32, node: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            numeric_id,
            node: node.into(),
            name: name.into(),
        }
    }

    /// API path of this VM below `/nodes`, e.g. `nodes/pve1/qemu/4201`.
    pub(crate) fn api_path(&self) -> String {
        format!("nodes/{}/qemu/{}", self.node, self.numeric_id)
    }
}

impl TryFrom<&ClusterResource> for VmHandle {
    type Error = MalformedIdError;

    fn try_from(resource: &ClusterResource) -> Result<Self, Self::Error> {
        let numeric_id = parse_vm_id(&resource.id)?;
        let node = resource.node.clone().ok_or_else(|| MalformedIdError {
            id: resource.id.clone(),
            reason: "resource has no node".to_string(),
        })?;
        let name = resource
            .name
            .clone()
            .unwrap_or_else(|| format!("VM {}", numeric_id));
        Ok(Self {
            numeric_id,
            node,
            name,
        })
    }
}
