use crate::core::domain::model::cluster_credentials::ClusterCredentials;

/// Form body of `POST /access/ticket`.
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn from_credentials(credentials: &ClusterCredentials) -> Self {
        Self {
            username: credentials.username().as_str().to_string(),
            password: credentials.password().as_str().to_string(),
        }
    }

    pub fn into_form(self) -> [(&'static str, String); 2] {
        [("username", self.username), ("password", self.password)]
    }
}
