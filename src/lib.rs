mod auth;
mod cloning;
mod core;
mod inventory;
mod lifecycle;
mod network;
mod session;

pub use crate::{
    cloning::application::{
        request::clone_request::{CloneConfig, DEFAULT_ID_FLOOR},
        service::clone_service::IdAllocator,
    },
    core::{
        domain::{
            error::{
                AuthError, CloneError, ConnectError, HealthError, InventoryError, MalformedIdError,
                NetworkResolutionError, StartError, TransportError, ValidationError, VdiError,
                VdiResult,
            },
            model::{
                clone_job::{CloneJob, TaskStatus},
                cluster_credentials::ClusterCredentials,
                cluster_resource::ClusterResource,
                connection_blob::ConnectionBlob,
                network_interface::NetworkInterface,
                proxmox_auth::ProxmoxAuth,
                vm_handle::VmHandle,
            },
            value_object::{
                ProxmoxCSRFToken, ProxmoxHost, ProxmoxPassword, ProxmoxTicket, ProxmoxUsername,
                VM_ID_MAX, parse_vm_id,
            },
        },
        infrastructure::{
            config::{ClientConfig, DEFAULT_PORT, RateLimitConfig},
            poll::PollPolicy,
        },
    },
    network::application::service::network_resolver::{reference_network, select_address},
    session::application::{
        service::session_pipeline::{SessionOutcome, Stage, StatusSink, VmSelection},
        sink::{ConnectionSink, file_sink::FileSink},
    },
};
pub use tokio_util::sync::CancellationToken;

use crate::{
    auth::application::service::login_service::LoginService,
    core::infrastructure::api_client::ApiClient,
    inventory::application::service::inventory_service::{InventoryService, vm_handles},
    session::application::service::session_pipeline::SessionPipeline,
};
use std::time::Duration;

/// A client for opening remote-desktop sessions on Proxmox VE virtual machines
///
/// This client provides:
/// - VM listing for a user's credentials
/// - The full session establishment run: login, optional template clone,
///   start, node address resolution and proxy ticket retrieval
/// - Cooperative cancellation of everything in flight
///
/// # Examples
///
/// ```no_run
/// use pve_vdi::{ClusterCredentials, FileSink, Stage, VdiClient, VdiResult, VmSelection};
///
/// #[tokio::main]
/// async fn main() -> VdiResult<()> {
///     let client = VdiClient::builder()
///         .port(8006)
///         .accept_invalid_certs(true)
///         .build()?;
///
///     let credentials = ClusterCredentials::from_json_file("credentials.json").await?;
///     for vm in client.list_vms(&credentials).await? {
///         println!("{}: {}", vm.numeric_id, vm.name);
///     }
///
///     let sink = FileSink::new("/tmp/session.vv");
///     let status = |stage: Stage| println!("{}", stage);
///     client
///         .establish_session(&credentials, VmSelection::Existing(4201), &status, &sink)
///         .await?;
///     Ok(())
/// }
/// ```
pub struct VdiClient {
    api_client: ApiClient,
    clone_config: Option<CloneConfig>,
    health_policy: PollPolicy,
    clone_policy: PollPolicy,
}

/// Builder for VdiClient configuration
#[derive(Debug, Default)]
pub struct VdiClientBuilder {
    config: ClientConfig,
    clone_config: Option<CloneConfig>,
    health_policy: Option<PollPolicy>,
    clone_policy: Option<PollPolicy>,
    cancel: Option<CancellationToken>,
}

impl VdiClientBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    /// Accept self-signed node certificates, as most clusters use them.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.accept_invalid_certs = accept;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn rate_limit(mut self, requests_per_second: u32, burst_size: u32) -> Self {
        self.config.rate_limit = Some(RateLimitConfig {
            requests_per_second,
            burst_size,
        });
        self
    }

    /// Storage and pool for clones; required for [`VmSelection::CloneTemplate`].
    pub fn clone_config(mut self, config: CloneConfig) -> Self {
        self.clone_config = Some(config);
        self
    }

    pub fn health_policy(mut self, policy: PollPolicy) -> Self {
        self.health_policy = Some(policy);
        self
    }

    pub fn clone_policy(mut self, policy: PollPolicy) -> Self {
        self.clone_policy = Some(policy);
        self
    }

    /// Token that aborts every call and wait of the built client.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validates the configuration and builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`VdiError::Validation`] for an invalid port, timeout, rate
    /// limit, poll policy or clone configuration, and [`VdiError::Transport`] if the HTTP
    /// client cannot be constructed.
    pub fn build(self) -> VdiResult<VdiClient> {
        if let Some(clone_config) = &self.clone_config {
            clone_config.validate()?;
        }
        let health_policy = self.health_policy.unwrap_or_else(PollPolicy::guest_agent);
        let clone_policy = self.clone_policy.unwrap_or_else(PollPolicy::clone_task);
        health_policy.validate()?;
        clone_policy.validate()?;
        let api_client = ApiClient::new(self.config, self.cancel.unwrap_or_default())?;

        Ok(VdiClient {
            api_client,
            clone_config: self.clone_config,
            health_policy,
            clone_policy,
        })
    }
}

impl VdiClient {
    /// Creates a new builder for VdiClient configuration
    pub fn builder() -> VdiClientBuilder {
        VdiClientBuilder::default()
    }

    /// Authenticates against the credentials' login node.
    pub async fn login(&self, credentials: &ClusterCredentials) -> VdiResult<ProxmoxAuth> {
        Ok(LoginService::new(self.api_client.clone())
            .authenticate(credentials)
            .await?)
    }

    /// Logs in and lists every VM of the cluster, templates included.
    ///
    /// # Errors
    ///
    /// This method will return an error if:
    /// - The credentials are rejected or the login node is unreachable
    /// - The inventory request fails
    /// - A VM entry carries a malformed id
    pub async fn list_vms(&self, credentials: &ClusterCredentials) -> VdiResult<Vec<VmHandle>> {
        let auth = self.login(credentials).await?;
        let resources = InventoryService::new(self.api_client.clone())
            .list_vms(&auth)
            .await?;
        Ok(vm_handles(&resources)?)
    }

    /// Runs the whole session establishment for `selection`.
    ///
    /// Stage changes are published to `status`; the connection blob goes to
    /// `sink` unchanged.
    pub async fn establish_session(
        &self,
        credentials: &ClusterCredentials,
        selection: VmSelection,
        status: &dyn StatusSink,
        sink: &dyn ConnectionSink,
    ) -> VdiResult<SessionOutcome> {
        let mut pipeline = SessionPipeline::new(self.api_client.clone())
            .with_health_policy(self.health_policy)
            .with_clone_policy(self.clone_policy);
        if let Some(config) = &self.clone_config {
            pipeline = pipeline.with_clone_config(config.clone());
        }
        pipeline.run(credentials, selection, status, sink).await
    }

    /// Aborts every in-flight call and wait of this client.
    pub fn cancel(&self) {
        self.api_client.cancellation().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.api_client.cancellation().is_cancelled()
    }
}
