use serde::Deserialize;

/// `data` member of a successful `POST /access/ticket`.
#[derive(Deserialize)]
pub struct LoginResponseData {
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_token: String,
    /// Canonical `user@realm` as the server resolved it.
    #[serde(default)]
    pub username: Option<String>,
    /// Absent on standalone nodes.
    #[serde(default)]
    pub clustername: Option<String>,
}
