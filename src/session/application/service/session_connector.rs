//! Requesting the SPICE proxy ticket for a VM.

use crate::{
    core::{
        domain::{
            error::ConnectError,
            model::{connection_blob::ConnectionBlob, proxmox_auth::ProxmoxAuth, vm_handle::VmHandle},
            value_object::ApiFormat,
        },
        infrastructure::api_client::ApiClient,
    },
    lifecycle::application::service::lifecycle_service::{LifecycleService, NOT_RUNNING_MARKER},
};
use reqwest::StatusCode;
use tracing::{info, warn};

pub struct SessionConnector {
    api_client: ApiClient,
    lifecycle: LifecycleService,
}

impl SessionConnector {
    pub fn new(api_client: ApiClient, lifecycle: LifecycleService) -> Self {
        Self {
            api_client,
            lifecycle,
        }
    }

    /// Obtains the connection blob for `vm` from the node `auth` was issued by.
    ///
    /// If the node reports the VM as not running, the VM is started and
    /// awaited once and the request is repeated a single time. The body is
    /// returned byte-for-byte.
    pub async fn request_connection(
        &self,
        auth: &ProxmoxAuth,
        vm: &VmHandle,
    ) -> Result<ConnectionBlob, ConnectError> {
        let path = format!("{}/spiceproxy", vm.api_path());
        let form = [("proxy", auth.node_address().to_string())];
        let mut auto_started = false;

        loop {
            info!(node = %vm.node, vmid = vm.numeric_id, proxy = %auth.node_address(), "requesting proxy ticket");
            let response = self
                .api_client
                .post_form(auth, ApiFormat::SpiceConfig, &path, &form)
                .await?;

            if response.is_ok() {
                return Ok(ConnectionBlob::new(response.into_body()));
            }

            let not_running = response.status() == StatusCode::INTERNAL_SERVER_ERROR
                && response.mentions(NOT_RUNNING_MARKER);
            if !not_running {
                return Err(ConnectError::Rejected {
                    vmid: vm.numeric_id,
                    status: response.status().as_u16(),
                    message: response.message(),
                });
            }
            if auto_started {
                return Err(ConnectError::StillNotRunning {
                    vmid: vm.numeric_id,
                    message: response.message(),
                });
            }

            warn!(vmid = vm.numeric_id, "VM not running, starting it");
            self.lifecycle.start_vm(auth, vm).await?;
            self.lifecycle.wait_until_healthy(auth, vm).await?;
            auto_started = true;
        }
    }
}
