//! The full session establishment run, from login to connection hand-off.

use crate::{
    auth::application::service::login_service::LoginService,
    cloning::application::{request::clone_request::CloneConfig, service::clone_service::CloneService},
    core::{
        domain::{
            error::{ValidationError, VdiError, VdiResult},
            model::{
                clone_job::CloneJob, cluster_credentials::ClusterCredentials, vm_handle::VmHandle,
            },
            value_object::ProxmoxHost,
        },
        infrastructure::{api_client::ApiClient, poll::PollPolicy},
    },
    inventory::application::service::inventory_service::{InventoryService, find_vm},
    lifecycle::application::service::lifecycle_service::LifecycleService,
    network::application::service::network_resolver::NetworkResolver,
    session::application::{service::session_connector::SessionConnector, sink::ConnectionSink},
};
use std::fmt;
use tracing::info;

/// Which VM the user picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmSelection {
    /// Connect to this VM as-is.
    Existing(u32),
    /// Clone this template and connect to the clone.
    CloneTemplate(u32),
}

impl VmSelection {
    #[must_use]
    pub fn numeric_id(&self) -> u32 {
        match self {
            VmSelection::Existing(id) | VmSelection::CloneTemplate(id) => *id,
        }
    }
}

/// Stages reported while a run progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticating,
    ListingVms,
    Cloning,
    Starting,
    WaitingForGuest,
    ResolvingNetwork,
    Reauthenticating,
    Connecting,
    HandingOff,
    Done,
}

impl Stage {
    /// Short status line for a user-facing label.
    #[must_use]
    pub fn status_text(&self) -> &'static str {
        match self {
            Stage::Authenticating => "Logging in",
            Stage::ListingVms => "Loading virtual machines",
            Stage::Cloning => "Cloning template",
            Stage::Starting => "Starting virtual machine",
            Stage::WaitingForGuest => "Waiting for guest to boot",
            Stage::ResolvingNetwork => "Locating host node",
            Stage::Reauthenticating => "Logging in to host node",
            Stage::Connecting => "Requesting connection",
            Stage::HandingOff => "Opening session",
            Stage::Done => "Connected",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}

/// Observer of stage transitions.
pub trait StatusSink: Send + Sync {
    fn publish(&self, stage: Stage);
}

impl<F> StatusSink for F
where
    F: Fn(Stage) + Send + Sync,
{
    fn publish(&self, stage: Stage) {
        self(stage)
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// The VM the session was opened for; the clone when one was made.
    pub vm: VmHandle,
    pub clone_job: Option<CloneJob>,
    /// Address the connection was requested from.
    pub node_address: ProxmoxHost,
    /// Whether the run issued a start command.
    pub started: bool,
}

/// Drives one session establishment run.
///
/// Stages run strictly in order; the first failure ends the run and is
/// returned as a [`VdiError`] naming its stage.
pub struct SessionPipeline {
    api_client: ApiClient,
    clone_config: Option<CloneConfig>,
    health_policy: PollPolicy,
    clone_policy: PollPolicy,
}

impl SessionPipeline {
    pub fn new(api_client: ApiClient) -> Self {
        Self {
            api_client,
            clone_config: None,
            health_policy: PollPolicy::guest_agent(),
            clone_policy: PollPolicy::clone_task(),
        }
    }

    /// Enables [`VmSelection::CloneTemplate`].
    pub fn with_clone_config(mut self, config: CloneConfig) -> Self {
        self.clone_config = Some(config);
        self
    }

    pub fn with_health_policy(mut self, policy: PollPolicy) -> Self {
        self.health_policy = policy;
        self
    }

    pub fn with_clone_policy(mut self, policy: PollPolicy) -> Self {
        self.clone_policy = policy;
        self
    }

    /// Runs every stage for `selection` and hands the connection blob to `sink`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails. A cancelled run
    /// fails with an error for which [`VdiError::is_cancelled`] is true.
    pub async fn run(
        &self,
        credentials: &ClusterCredentials,
        selection: VmSelection,
        status: &dyn StatusSink,
        sink: &dyn ConnectionSink,
    ) -> VdiResult<SessionOutcome> {
        let login = LoginService::new(self.api_client.clone());
        let lifecycle = LifecycleService::new(self.api_client.clone(), self.health_policy);

        status.publish(Stage::Authenticating);
        let auth = login.authenticate(credentials).await?;

        status.publish(Stage::ListingVms);
        let resources = InventoryService::new(self.api_client.clone())
            .list_vms(&auth)
            .await?;
        let numeric_id = selection.numeric_id();
        let resource = find_vm(&resources, numeric_id).ok_or(VdiError::VmNotFound(numeric_id))?;
        let selected = VmHandle::try_from(resource)?;

        let (vm, clone_job, needs_start) = match selection {
            VmSelection::Existing(_) => (selected, None, !resource.is_running()),
            VmSelection::CloneTemplate(_) => {
                let config = self.clone_config.clone().ok_or_else(|| {
                    ValidationError::ConstraintViolation(
                        "cloning requires a clone storage and pool".to_string(),
                    )
                })?;
                status.publish(Stage::Cloning);
                let (clone, job) = CloneService::new(self.api_client.clone(), config, self.clone_policy)
                    .clone_template(&auth, &selected)
                    .await?;
                (clone, Some(job), true)
            }
        };

        if needs_start {
            status.publish(Stage::Starting);
            lifecycle.start_vm(&auth, &vm).await?;
            status.publish(Stage::WaitingForGuest);
            lifecycle.wait_until_healthy(&auth, &vm).await?;
        }

        let session_auth = if vm.node == credentials.login_node_name() {
            auth
        } else {
            status.publish(Stage::ResolvingNetwork);
            let node_credentials = NetworkResolver::new(self.api_client.clone())
                .resolve_reachable_address(&auth, credentials, &vm.node)
                .await?;
            status.publish(Stage::Reauthenticating);
            login.authenticate(&node_credentials).await?
        };

        status.publish(Stage::Connecting);
        let blob = SessionConnector::new(self.api_client.clone(), lifecycle)
            .request_connection(&session_auth, &vm)
            .await?;

        status.publish(Stage::HandingOff);
        sink.deliver(&blob).await?;

        info!(vmid = vm.numeric_id, node = %vm.node, bytes = blob.len(), "session ready");
        status.publish(Stage::Done);

        Ok(SessionOutcome {
            vm,
            clone_job,
            node_address: session_auth.node_address().clone(),
            started: needs_start,
        })
    }
}
