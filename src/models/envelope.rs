//! Response envelope shared by all Tuya cloud endpoints.

use serde::Deserialize;

/// Every cloud response wraps its payload in this envelope. `success`
/// is the business verdict; HTTP status is 200 even for failures.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Error message for a failed response, with a fallback for
    /// envelopes that omit `msg`.
    pub fn error_msg(&self) -> String {
        self.msg.clone().unwrap_or_else(|| "unknown error".into())
    }
}
