use std::time::Duration;
use thiserror::Error;

/// The top-level error type for a session establishment run.
///
/// Every pipeline stage has its own error type; this enum wraps them so the
/// presentation layer can report which stage failed (see [`VdiError::stage`])
/// together with the server-provided text carried by the inner error.
#[derive(Error, Debug)]
pub enum VdiError {
    /// Input validation failed before anything was sent to the cluster.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The HTTP layer could not be set up or failed outside of a stage.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The credentials file could not be read or parsed.
    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Inventory failed: {0}")]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    MalformedId(#[from] MalformedIdError),

    /// The requested VM id is not part of the cluster inventory.
    #[error("VM {0} not found in cluster inventory")]
    VmNotFound(u32),

    #[error("Clone failed: {0}")]
    Clone(#[from] CloneError),

    #[error("Start failed: {0}")]
    Start(#[from] StartError),

    #[error("Health check failed: {0}")]
    Health(#[from] HealthError),

    #[error("Network resolution failed: {0}")]
    NetworkResolution(#[from] NetworkResolutionError),

    #[error("Connection failed: {0}")]
    Connect(#[from] ConnectError),

    /// The connection blob could not be handed to the sink.
    #[error("Sink error: {0}")]
    Sink(String),
}

impl VdiError {
    /// Name of the pipeline stage this error belongs to.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            VdiError::Validation(_) | VdiError::Credentials(_) => "configuration",
            VdiError::Transport(_) => "transport",
            VdiError::Auth(_) => "authentication",
            VdiError::Inventory(_) | VdiError::MalformedId(_) | VdiError::VmNotFound(_) => {
                "inventory"
            }
            VdiError::Clone(_) => "clone",
            VdiError::Start(_) => "start",
            VdiError::Health(_) => "health",
            VdiError::NetworkResolution(_) => "network resolution",
            VdiError::Connect(_) => "connect",
            VdiError::Sink(_) => "handoff",
        }
    }

    /// Returns true if the run stopped because its cancellation token fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let transport = match self {
            VdiError::Transport(e) => Some(e),
            VdiError::Auth(AuthError::Transport(e))
            | VdiError::Inventory(InventoryError::Transport(e))
            | VdiError::Clone(CloneError::Transport(e))
            | VdiError::Start(StartError::Transport(e))
            | VdiError::Health(HealthError::Transport(e))
            | VdiError::NetworkResolution(NetworkResolutionError::Transport(e))
            | VdiError::Connect(ConnectError::Transport(e)) => Some(e),
            VdiError::NetworkResolution(NetworkResolutionError::Auth(AuthError::Transport(e))) => {
                Some(e)
            }
            VdiError::Connect(ConnectError::Start(StartError::Transport(e)))
            | VdiError::Connect(ConnectError::Health(HealthError::Transport(e))) => Some(e),
            _ => None,
        };
        matches!(transport, Some(TransportError::Cancelled))
    }
}

/// Specialized error type for validation failures.
///
/// This enum provides detailed context about why a validation
/// failed, including field-specific errors and format violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Represents a validation failure for a specific field
    ///
    /// # Fields
    /// * `field` - The name of the field that failed validation
    /// * `message` - A detailed message about why validation failed
    #[error("Field '{field}' validation failed: {message}")]
    Field { field: String, message: String },

    /// Represents format/syntax validation failures
    #[error("Format error: {0}")]
    Format(String),

    /// Represents violations of domain constraints
    #[error("Domain constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Failures of the HTTP layer itself, shared by every stage.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request could not be built or sent, or the body could not be read.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request URL could not be built from the node address and path.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The response body did not have the expected shape.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The run's cancellation token fired before the call completed.
    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Invalid credentials provided")]
    InvalidCredentials,

    #[error("Unexpected response status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("Malformed login response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unexpected response status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
}

/// A cluster resource id that does not carry a `<type>/<number>` suffix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed resource id '{id}': {reason}")]
pub struct MalformedIdError {
    pub id: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum CloneError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server refused the clone for a reason other than the id.
    #[error("Clone rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Every candidate id was refused by the server.
    #[error("No free VM id after {attempts} attempts (last server message: {message})")]
    IdAllocationExhausted { attempts: u32, message: String },

    /// The clone task finished with a non-OK exit status.
    #[error("Clone task {upid} failed: {exitstatus}")]
    TaskFailed { upid: String, exitstatus: String },

    #[error("Clone task {upid} did not finish within {elapsed:?} (last status: {status})")]
    Timeout {
        upid: String,
        status: String,
        elapsed: Duration,
    },
}

#[derive(Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Start of VM {vmid} rejected ({status}): {message}")]
    Rejected {
        vmid: u32,
        status: u16,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum HealthError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Guest agent of VM {vmid} answered {status}: {message}")]
    Unexpected {
        vmid: u32,
        status: u16,
        message: String,
    },

    #[error("Guest agent of VM {vmid} not ready after {elapsed:?} ({attempts} pings)")]
    Timeout {
        vmid: u32,
        attempts: u32,
        elapsed: Duration,
    },
}

#[derive(Error, Debug)]
pub enum NetworkResolutionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Re-authentication against node failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Listing interfaces of node {node} failed ({status}): {message}")]
    UnexpectedStatus {
        node: String,
        status: u16,
        message: String,
    },

    /// The login address is not configured on any interface of the login node.
    #[error("No interface of node {node} carries address {address}")]
    NoReferenceInterface { node: String, address: String },

    #[error("Interface {iface} has an invalid CIDR '{cidr}'")]
    InvalidCidr { iface: String, cidr: String },

    /// None of the target node's addresses lie in the reference network.
    #[error("No address of node {node} lies within {network}")]
    NoMatchingAddress { node: String, network: String },
}

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Auto-start failed: {0}")]
    Start(#[from] StartError),

    #[error("Waiting for guest failed: {0}")]
    Health(#[from] HealthError),

    /// The VM still reported "not running" after one start-and-wait cycle.
    #[error("VM {vmid} still not running after auto-start: {message}")]
    StillNotRunning { vmid: u32, message: String },

    #[error("Proxy ticket for VM {vmid} rejected ({status}): {message}")]
    Rejected {
        vmid: u32,
        status: u16,
        message: String,
    },
}

/// Type alias for Results that may fail with a VdiError
pub type VdiResult<T> = Result<T, VdiError>;
