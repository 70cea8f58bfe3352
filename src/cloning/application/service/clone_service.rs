//! Template cloning with client-side VM id allocation.

use crate::{
    cloning::application::request::clone_request::{CloneConfig, CloneRequest},
    core::{
        domain::{
            error::{CloneError, TransportError},
            model::{
                clone_job::{CloneJob, TaskStatus, TaskStatusResponse},
                proxmox_auth::ProxmoxAuth,
                vm_handle::VmHandle,
            },
            value_object::{ApiFormat, VM_ID_MAX},
        },
        infrastructure::{
            api_client::{ApiClient, ApiResponse},
            poll::{PollPolicy, PollStop, Poller},
        },
    },
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info, warn};

/// Draws candidate VM ids uniformly from the id space above a floor.
///
/// A heuristic, not a reservation: the server may still refuse a candidate,
/// in which case the caller asks for another one.
pub struct IdAllocator {
    floor: u32,
    last: Option<u32>,
    rng: StdRng,
}

impl IdAllocator {
    pub fn new(floor: u32) -> Self {
        Self::with_rng(floor, StdRng::from_entropy())
    }

    pub fn with_rng(floor: u32, rng: StdRng) -> Self {
        Self {
            floor: floor.min(VM_ID_MAX - 1),
            last: None,
            rng,
        }
    }

    /// Returns a candidate `>= floor` that differs from the previous one.
    pub fn next_id(&mut self) -> u32 {
        // Drawing from [floor, max] directly is the same distribution as
        // drawing from the whole space and discarding ids below the floor.
        loop {
            let candidate = self.rng.gen_range(self.floor..=VM_ID_MAX);
            if Some(candidate) != self.last {
                self.last = Some(candidate);
                return candidate;
            }
        }
    }
}

/// Markers of a refused `newid` (taken, reserved or invalid).
const ID_REJECTION_MARKERS: [&str; 3] = ["already exists", "newid", "already in use"];

fn is_id_rejection(response: &ApiResponse) -> bool {
    ID_REJECTION_MARKERS
        .iter()
        .any(|marker| response.mentions(marker))
}

pub struct CloneService {
    api_client: ApiClient,
    config: CloneConfig,
    task_policy: PollPolicy,
}

impl CloneService {
    pub fn new(api_client: ApiClient, config: CloneConfig, task_policy: PollPolicy) -> Self {
        Self {
            api_client,
            config,
            task_policy,
        }
    }

    /// Clones `template` onto a fresh VM id and waits for the clone task.
    pub async fn clone_template(
        &self,
        auth: &ProxmoxAuth,
        template: &VmHandle,
    ) -> Result<(VmHandle, CloneJob), CloneError> {
        self.clone_template_with(auth, template, &mut IdAllocator::new(self.config.id_floor))
            .await
    }

    /// [`CloneService::clone_template`] with a caller-provided allocator.
    pub async fn clone_template_with(
        &self,
        auth: &ProxmoxAuth,
        template: &VmHandle,
        allocator: &mut IdAllocator,
    ) -> Result<(VmHandle, CloneJob), CloneError> {
        let (newid, name, upid) = self.submit_clone(auth, template, allocator).await?;
        let clone = VmHandle::new(newid, template.node.clone(), name);

        let status = self.wait_for_task(auth, &template.node, &upid).await?;
        info!(template = template.numeric_id, vmid = newid, %upid, "clone finished");

        Ok((
            clone,
            CloneJob {
                target_numeric_id: newid,
                upid,
                status,
            },
        ))
    }

    /// Posts clone requests until one id is accepted; returns id, name and task id.
    async fn submit_clone(
        &self,
        auth: &ProxmoxAuth,
        template: &VmHandle,
        allocator: &mut IdAllocator,
    ) -> Result<(u32, String, String), CloneError> {
        let path = format!("{}/clone", template.api_path());
        let mut last_message = String::new();

        for attempt in 1..=self.config.max_id_attempts {
            let request = CloneRequest::new(&self.config, allocator.next_id());
            let (newid, name) = (request.newid, request.name.clone());
            info!(template = template.numeric_id, vmid = newid, attempt, "cloning template");

            let response = self
                .api_client
                .post_form(auth, ApiFormat::Json, &path, &request.into_form())
                .await?;

            if response.is_ok() {
                let upid: String = response.data()?;
                return Ok((newid, name, upid));
            }
            if !is_id_rejection(&response) {
                return Err(CloneError::Rejected {
                    status: response.status().as_u16(),
                    message: response.message(),
                });
            }
            last_message = response.message();
            warn!(vmid = newid, attempt, message = %last_message, "VM id refused, drawing another");
        }

        Err(CloneError::IdAllocationExhausted {
            attempts: self.config.max_id_attempts,
            message: last_message,
        })
    }

    async fn wait_for_task(
        &self,
        auth: &ProxmoxAuth,
        node: &str,
        upid: &str,
    ) -> Result<TaskStatus, CloneError> {
        let path = format!("nodes/{}/tasks/{}/status", node, upid);
        let mut poller = Poller::new(self.task_policy, self.api_client.cancellation().clone());
        let mut last_status = TaskStatus::Running;

        loop {
            poller.ready().await.map_err(|stop| match stop {
                PollStop::Cancelled => CloneError::Transport(TransportError::Cancelled),
                PollStop::DeadlineExceeded => CloneError::Timeout {
                    upid: upid.to_string(),
                    status: last_status.to_string(),
                    elapsed: poller.elapsed(),
                },
            })?;

            let response = self.api_client.get(auth, &path).await?;
            if !response.is_ok() {
                return Err(CloneError::Rejected {
                    status: response.status().as_u16(),
                    message: response.message(),
                });
            }

            let status: TaskStatus = response.data::<TaskStatusResponse>()?.into();
            debug!(%upid, %status, attempt = poller.attempts(), "clone task status");

            match status {
                TaskStatus::Stopped { exitstatus } if exitstatus != "OK" => {
                    return Err(CloneError::TaskFailed {
                        upid: upid.to_string(),
                        exitstatus,
                    });
                }
                status if status.is_success() => return Ok(status),
                status => last_status = status,
            }
        }
    }
}
