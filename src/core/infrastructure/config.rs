//! Process-wide client settings, built once and passed to [`super::api_client::ApiClient`].

use crate::core::domain::error::ValidationError;
use std::time::Duration;

/// Default Proxmox VE API port.
pub const DEFAULT_PORT: u16 = 8006;

/// Rate limit applied to every API call of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// HTTP settings shared by every node the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API port, identical on every node.
    pub port: u16,
    /// `https` when true, `http` otherwise.
    pub secure: bool,
    /// Accept self-signed node certificates.
    pub accept_invalid_certs: bool,
    /// Per-request timeout, covering connect and body transfer.
    pub request_timeout: Duration,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            secure: true,
            accept_invalid_certs: false,
            request_timeout: Duration::from_secs(10),
            rate_limit: None,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::Field {
                field: "port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ValidationError::Field {
                field: "request_timeout".to_string(),
                message: "Request timeout must be positive".to_string(),
            });
        }
        if let Some(rl) = self.rate_limit {
            if rl.requests_per_second == 0 || rl.burst_size == 0 {
                return Err(ValidationError::ConstraintViolation(
                    "Rate limit and burst size must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}
