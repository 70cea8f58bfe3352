//! Internal HTTP client shared by every pipeline stage.

use crate::core::{
    domain::{
        error::{TransportError, VdiResult},
        model::proxmox_auth::ProxmoxAuth,
        value_object::{ApiFormat, ProxmoxCSRFToken, ProxmoxHost, ProxmoxUrl},
    },
    infrastructure::config::ClientConfig,
};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{Client, Method, RequestBuilder, StatusCode, header::COOKIE};
use serde::{Deserialize, de::DeserializeOwned};
use std::borrow::Cow;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Form fields of a request body.
pub type FormFields<'a> = [(&'a str, String)];

/// HTTP client that speaks the Proxmox wire conventions.
///
/// One instance serves every node of a run: the target address comes from the
/// [`ProxmoxAuth`] of each call, so a session can never be sent to a node that
/// did not issue it. Each call adds the `PVEAuthCookie` cookie and the
/// `CSRFPreventionToken` header, is rate limited when configured, and is raced
/// against the run's cancellation token.
///
/// Non-2xx statuses are not errors at this level: stages need the status and
/// the server's text to decide between retrying and failing.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http_client: Client,
    config: Arc<ClientConfig>,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
    cancel: CancellationToken,
}

/// Status and body of a completed API call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: Vec<u8>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The API signals success with exactly `200 OK`.
    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Case-insensitive search for `marker` in the body.
    pub fn mentions(&self, marker: &str) -> bool {
        self.text()
            .to_ascii_lowercase()
            .contains(&marker.to_ascii_lowercase())
    }

    /// The server-provided explanation of this response.
    ///
    /// Uses the `message` or `errors` members of a JSON error body when
    /// present, the raw body otherwise, and the canonical reason phrase for
    /// empty bodies.
    pub fn message(&self) -> String {
        if let Ok(serde_json::Value::Object(map)) =
            serde_json::from_slice::<serde_json::Value>(&self.body)
        {
            if let Some(message) = map.get("message").and_then(|m| m.as_str()) {
                return message.trim().to_string();
            }
            if let Some(serde_json::Value::Object(errors)) = map.get("errors") {
                return errors
                    .iter()
                    .map(|(field, err)| match err.as_str() {
                        Some(err) => format!("{}: {}", field, err.trim()),
                        None => format!("{}: {}", field, err),
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
            }
        }
        let text = self.text();
        let text = text.trim();
        if text.is_empty() || text == r#"{"data":null}"# {
            self.status
                .canonical_reason()
                .unwrap_or("no reason given")
                .to_string()
        } else {
            text.to_string()
        }
    }

    /// Decodes the `data` member of a JSON body.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice::<Envelope<T>>(&self.body)
            .map(|envelope| envelope.data)
            .map_err(|e| TransportError::Parse(e.to_string()))
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

impl ApiClient {
    /// Creates a client from process-wide settings.
    ///
    /// # Errors
    /// Returns `VdiError::Validation` for an invalid configuration and
    /// `VdiError::Transport` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, cancel: CancellationToken) -> VdiResult<Self> {
        config.validate()?;

        let http_client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let rate_limiter = match config.rate_limit {
            Some(rl) => {
                let rate = NonZeroU32::new(rl.requests_per_second)
                    .zip(NonZeroU32::new(rl.burst_size))
                    .map(|(rate, burst)| Quota::per_second(rate).allow_burst(burst));
                rate.map(|quota| Arc::new(DefaultDirectRateLimiter::direct(quota)))
            }
            None => None,
        };

        Ok(Self {
            http_client,
            config: Arc::new(config),
            rate_limiter,
            cancel,
        })
    }

    /// The token every call of this client is raced against.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Unauthenticated form POST, used for ticket issuance.
    pub async fn post_form_anonymous(
        &self,
        address: &ProxmoxHost,
        path: &str,
        form: &FormFields<'_>,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.url(address, ApiFormat::Json, path)?;
        let request = self.http_client.post(url).form(form);
        self.execute(Method::POST, path, request).await
    }

    /// Authenticated GET against `/api2/json`.
    pub async fn get(&self, auth: &ProxmoxAuth, path: &str) -> Result<ApiResponse, TransportError> {
        let url = self.url(auth.node_address(), ApiFormat::Json, path)?;
        let request = self.authorize(self.http_client.get(url), auth);
        self.execute(Method::GET, path, request).await
    }

    /// Authenticated, form-encoded POST.
    pub async fn post_form(
        &self,
        auth: &ProxmoxAuth,
        format: ApiFormat,
        path: &str,
        form: &FormFields<'_>,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.url(auth.node_address(), format, path)?;
        let request = self.authorize(self.http_client.post(url).form(form), auth);
        self.execute(Method::POST, path, request).await
    }

    fn url(
        &self,
        address: &ProxmoxHost,
        format: ApiFormat,
        path: &str,
    ) -> Result<Url, TransportError> {
        ProxmoxUrl::new(address, self.config.port, self.config.secure)
            .and_then(|base| base.api(format, path))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }

    fn authorize(&self, request: RequestBuilder, auth: &ProxmoxAuth) -> RequestBuilder {
        request
            .header(COOKIE, auth.ticket().as_cookie_header())
            .header(ProxmoxCSRFToken::HEADER, auth.csrf_token().as_str())
    }

    /// Sends a request unless the run is cancelled, and reads the whole body.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> Result<ApiResponse, TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        if let Some(limiter) = &self.rate_limiter {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = limiter.until_ready() => {}
            }
        }

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TransportError::Cancelled),
            response = request.send() => response
                .map_err(|e| TransportError::Connection(format!("HTTP request failed: {}", e)))?,
        };

        let status = response.status();
        let body = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(TransportError::Cancelled),
            body = response.bytes() => body
                .map_err(|e| TransportError::Connection(format!("Failed to read response: {}", e)))?,
        };

        debug!(%method, path, status = status.as_u16(), bytes = body.len(), "api call");
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}
