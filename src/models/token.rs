//! Token grant payload from the token-issuance endpoint.

use serde::Deserialize;

/// `result` payload of `GET /v1.0/token?grant_type=1`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Token lifetime in seconds, relative to issuance.
    pub expire_time: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
