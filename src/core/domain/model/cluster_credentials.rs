//! Login material for one cluster, as handed over by the credentials loader.

use crate::core::domain::{
    error::{VdiError, VdiResult, ValidationError},
    value_object::{
        ProxmoxHost, ProxmoxPassword, ProxmoxUsername, validate_host, validate_password,
        validate_username,
    },
};
use serde::Deserialize;
use std::path::Path;

/// Username, password and the node the user logs in through.
///
/// Immutable once built. Crossing to another node goes through
/// [`ClusterCredentials::with_node`], which returns a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCredentials {
    username: ProxmoxUsername,
    password: ProxmoxPassword,
    login_node_address: ProxmoxHost,
    login_node_name: String,
}

/// On-disk shape of the credentials file.
#[derive(Deserialize)]
struct CredentialsFile {
    username: String,
    password: String,
    node: String,
    #[serde(alias = "address")]
    proxy: String,
}

impl ClusterCredentials {
    /// Builds validated credentials.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        login_node_name: impl Into<String>,
        login_node_address: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let username = username.into();
        let password = password.into();
        let login_node_name = login_node_name.into();
        let login_node_address = login_node_address.into();

        validate_username(&username)?;
        validate_password(&password)?;
        validate_host(&login_node_address)?;
        validate_node_name(&login_node_name)?;

        Ok(Self {
            username: ProxmoxUsername::new_unchecked(username),
            password: ProxmoxPassword::new_unchecked(password),
            login_node_address: ProxmoxHost::new_unchecked(login_node_address),
            login_node_name,
        })
    }

    /// Parses the JSON credentials document (`username`, `password`, `node`, `proxy`).
    pub fn from_json_str(json: &str) -> VdiResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| VdiError::Credentials(format!("invalid credentials JSON: {}", e)))?;
        Ok(Self::new(file.username, file.password, file.node, file.proxy)?)
    }

    /// Reads and parses a credentials file.
    pub async fn from_json_file(path: impl AsRef<Path>) -> VdiResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            VdiError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Returns a copy pointing at another node, keeping username and password.
    #[must_use]
    pub fn with_node(&self, node_name: impl Into<String>, node_address: ProxmoxHost) -> Self {
        Self {
            username: self.username.clone(),
            password: self.password.clone(),
            login_node_address: node_address,
            login_node_name: node_name.into(),
        }
    }

    pub fn username(&self) -> &ProxmoxUsername {
        &self.username
    }

    pub fn password(&self) -> &ProxmoxPassword {
        &self.password
    }

    pub fn login_node_address(&self) -> &ProxmoxHost {
        &self.login_node_address
    }

    pub fn login_node_name(&self) -> &str {
        &self.login_node_name
    }
}

fn validate_node_name(node: &str) -> Result<(), ValidationError> {
    if node.is_empty() {
        return Err(ValidationError::Field {
            field: "node".to_string(),
            message: "Node name cannot be empty".to_string(),
        });
    }
    if !node.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
        return Err(ValidationError::Format(format!(
            "Node name '{}' contains invalid characters",
            node
        )));
    }
    Ok(())
}
