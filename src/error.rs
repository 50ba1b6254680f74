//! Error types for Tuya cloud operations.

use thiserror::Error;

/// Errors surfaced by the auth and API layers.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Required credential or setting is missing from the env store.
    #[error("configuration error: {0}")]
    Config(String),

    /// The platform rejected the credentials or signature.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure (DNS, TLS, timeout, connect).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The platform reported the access token as invalid or expired.
    /// Callers retry the original request once after a forced refresh.
    #[error("access token rejected by platform (code {code})")]
    TokenInvalid { code: i64 },

    /// Business-level failure reported in the response envelope.
    #[error("cloud API error {code}: {msg}")]
    Api { code: i64, msg: String },
}

impl CloudError {
    /// True when the error means the token should be re-acquired and
    /// the request retried once.
    pub fn is_token_invalid(&self) -> bool {
        matches!(self, CloudError::TokenInvalid { .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
