use crate::core::domain::error::ValidationError;

/// A Proxmox CSRF protection token, echoed on every mutating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxmoxCSRFToken(String);

impl ProxmoxCSRFToken {
    /// Header name the token travels in.
    pub const HEADER: &'static str = "CSRFPreventionToken";

    /// Creates a new CSRF token without validation.
    pub(crate) fn new_unchecked(value: String) -> Self {
        Self(value)
    }

    /// Returns the token value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validates the format of a CSRF token string.
pub(crate) fn validate_csrf_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() {
        return Err(ValidationError::Field {
            field: "csrf_token".to_string(),
            message: "CSRF token cannot be empty".to_string(),
        });
    }
    if token.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::Format(
            "CSRF token must be a single header-safe word".to_string(),
        ));
    }
    Ok(())
}
