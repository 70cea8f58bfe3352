//! Starting VMs and waiting for their guest agent.

use crate::core::{
    domain::{
        error::{HealthError, StartError, TransportError},
        model::{proxmox_auth::ProxmoxAuth, vm_handle::VmHandle},
        value_object::ApiFormat,
    },
    infrastructure::{
        api_client::ApiClient,
        poll::{PollPolicy, PollStop, Poller},
    },
};
use reqwest::StatusCode;
use tracing::{debug, info};

/// Text the API puts in a 500 response when the VM, or its guest agent, is down.
pub(crate) const NOT_RUNNING_MARKER: &str = "not running";
const ALREADY_RUNNING_MARKER: &str = "already running";

pub struct LifecycleService {
    api_client: ApiClient,
    health_policy: PollPolicy,
}

impl LifecycleService {
    pub fn new(api_client: ApiClient, health_policy: PollPolicy) -> Self {
        Self {
            api_client,
            health_policy,
        }
    }

    /// Issues a start command. A VM that is already running counts as started.
    pub async fn start_vm(&self, auth: &ProxmoxAuth, vm: &VmHandle) -> Result<(), StartError> {
        info!(node = %vm.node, vmid = vm.numeric_id, "starting VM");
        let response = self
            .api_client
            .post_form(
                auth,
                ApiFormat::Json,
                &format!("{}/status/start", vm.api_path()),
                &[],
            )
            .await?;

        if response.is_ok() {
            return Ok(());
        }
        if response.mentions(ALREADY_RUNNING_MARKER) {
            debug!(vmid = vm.numeric_id, "VM already running");
            return Ok(());
        }
        Err(StartError::Rejected {
            vmid: vm.numeric_id,
            status: response.status().as_u16(),
            message: response.message(),
        })
    }

    /// Pings the guest agent until it answers `200`.
    ///
    /// A `500` reporting "not running" means the guest is still booting and is
    /// retried with backoff until the policy deadline; anything else is fatal.
    pub async fn wait_until_healthy(
        &self,
        auth: &ProxmoxAuth,
        vm: &VmHandle,
    ) -> Result<(), HealthError> {
        let path = format!("{}/agent/ping", vm.api_path());
        let mut poller = Poller::new(self.health_policy, self.api_client.cancellation().clone());

        loop {
            poller.ready().await.map_err(|stop| match stop {
                PollStop::Cancelled => HealthError::Transport(TransportError::Cancelled),
                PollStop::DeadlineExceeded => HealthError::Timeout {
                    vmid: vm.numeric_id,
                    attempts: poller.attempts(),
                    elapsed: poller.elapsed(),
                },
            })?;

            let response = self
                .api_client
                .post_form(auth, ApiFormat::Json, &path, &[])
                .await?;

            if response.is_ok() {
                info!(vmid = vm.numeric_id, attempts = poller.attempts(), "guest agent ready");
                return Ok(());
            }
            if response.status() == StatusCode::INTERNAL_SERVER_ERROR
                && response.mentions(NOT_RUNNING_MARKER)
            {
                debug!(
                    vmid = vm.numeric_id,
                    attempt = poller.attempts(),
                    message = %response.message(),
                    "guest agent not ready"
                );
                continue;
            }
            return Err(HealthError::Unexpected {
                vmid: vm.numeric_id,
                status: response.status().as_u16(),
                message: response.message(),
            });
        }
    }
}
