use crate::core::domain::{error::ValidationError, value_object::proxmox_host::ProxmoxHost};
use url::Url;

/// API flavours served under `/api2/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    /// `/api2/json`, every regular endpoint.
    Json,
    /// `/api2/spiceconfig`, returns a `remote-viewer` connection file.
    SpiceConfig,
}

impl ApiFormat {
    fn prefix(self) -> &'static str {
        match self {
            ApiFormat::Json => "api2/json",
            ApiFormat::SpiceConfig => "api2/spiceconfig",
        }
    }
}

/// Base URL of one node's API (`https://<address>:<port>/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxmoxUrl(Url);

impl ProxmoxUrl {
    /// Builds the base URL for a node address.
    pub fn new(host: &ProxmoxHost, port: u16, secure: bool) -> Result<Self, ValidationError> {
        let scheme = if secure { "https" } else { "http" };
        let authority = match host.as_ip() {
            Some(std::net::IpAddr::V6(ip)) => format!("[{}]", ip),
            _ => host.as_str().to_string(),
        };
        let url = Url::parse(&format!("{}://{}:{}/", scheme, authority, port))
            .map_err(|e| ValidationError::Format(format!("Invalid URL format: {}", e)))?;
        Ok(Self(url))
    }

    /// Returns the URL of an endpoint, e.g. `api(ApiFormat::Json, "cluster/resources")`.
    pub fn api(&self, format: ApiFormat, path: &str) -> Result<Url, ValidationError> {
        let path = format!("{}/{}", format.prefix(), path.trim_start_matches('/'));
        self.0
            .join(&path)
            .map_err(|e| ValidationError::Format(format!("Invalid API path '{}': {}", path, e)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}
