use crate::{
    auth::application::{
        request::login_request::LoginRequest, response::login_response::LoginResponseData,
    },
    core::{
        domain::{
            error::AuthError,
            model::{cluster_credentials::ClusterCredentials, proxmox_auth::ProxmoxAuth},
            value_object::{
                ProxmoxCSRFToken, ProxmoxHost, ProxmoxTicket, validate_csrf_token, validate_ticket,
            },
        },
        infrastructure::api_client::{ApiClient, ApiResponse},
    },
};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

/// Exchanges credentials for a ticket scoped to the credentials' node address.
///
/// Failures are reported, never retried: a 4xx means the credentials are
/// wrong, and transport retries belong to the caller.
pub struct LoginService {
    api_client: ApiClient,
}

impl LoginService {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    /// Authenticates against `credentials.login_node_address()`.
    ///
    /// # Errors
    ///
    /// This method will return an error if:
    /// - The node is unreachable or the run was cancelled
    /// - The credentials are rejected (`401`)
    /// - The server returns any other non-200 status
    /// - The response does not carry a ticket and CSRF token
    pub async fn authenticate(
        &self,
        credentials: &ClusterCredentials,
    ) -> Result<ProxmoxAuth, AuthError> {
        let address = credentials.login_node_address();
        info!(
            node = credentials.login_node_name(),
            %address,
            user = credentials.username().as_str(),
            "authenticating"
        );

        let form = LoginRequest::from_credentials(credentials).into_form();
        let response = self
            .api_client
            .post_form_anonymous(address, "access/ticket", &form)
            .await?;

        match response.status() {
            StatusCode::OK => self.handle_successful_login(&response, address),
            StatusCode::UNAUTHORIZED => {
                warn!(%address, "credentials rejected");
                Err(AuthError::InvalidCredentials)
            }
            status => Err(AuthError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.message(),
            }),
        }
    }

    fn handle_successful_login(
        &self,
        response: &ApiResponse,
        address: &ProxmoxHost,
    ) -> Result<ProxmoxAuth, AuthError> {
        let data = response
            .data::<Option<LoginResponseData>>()
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?
            .ok_or_else(|| AuthError::MalformedResponse("response carries no ticket".to_string()))?;

        validate_ticket(&data.ticket).map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        validate_csrf_token(&data.csrf_token)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        debug!(
            %address,
            user = data.username.as_deref().unwrap_or_default(),
            cluster = data.clustername.as_deref().unwrap_or("standalone"),
            "ticket issued"
        );

        Ok(ProxmoxAuth::new(
            ProxmoxTicket::new_unchecked(data.ticket),
            ProxmoxCSRFToken::new_unchecked(data.csrf_token),
            address.clone(),
        ))
    }
}
