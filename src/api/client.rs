//! Authenticated HTTP client for the Tuya cloud API
//!
//! Wraps `reqwest::Client` with signed-header injection. When the
//! platform reports the access token invalid, the client forces a
//! fresh acquisition and re-issues the original request exactly once;
//! a second failure surfaces to the caller.

use std::time::Duration;

use serde_json::Value;

use crate::auth::{SignInput, SignVersion, TokenAuthority};
use crate::error::{CloudError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Platform error codes that mean the token must be re-acquired.
/// The exact set is not documented in one place; these are the ones
/// observed in practice. A substring match on the body acts as a
/// compatibility shim for envelopes without a usable code.
const TOKEN_INVALID_CODES: [i64; 3] = [1010, 1011, 1012];
const TOKEN_INVALID_MARKER: &str = "token invalid";

/// Signed cloud client. Cheap to construct; shares the token state
/// through the authority handle.
pub struct CloudClient {
    http: reqwest::Client,
    authority: TokenAuthority,
}

impl CloudClient {
    pub fn new(authority: TokenAuthority) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, authority })
    }

    /// Build a client from the default env store.
    pub fn load(sign_version: SignVersion) -> Result<Self> {
        Self::new(TokenAuthority::load(sign_version)?)
    }

    /// Signed GET; returns the envelope's `result` payload.
    pub async fn get(&self, path: &str, query: Vec<(String, String)>) -> Result<Value> {
        self.request(SignInput::get(path).with_query(query)).await
    }

    /// Signed POST with a JSON body; returns the `result` payload.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let mut input = SignInput::post(path, body.to_string());
        // POST bodies are JSON; the content type is a signed header
        // per the platform recipe.
        input.signed_headers = vec![("Content-type".to_string(), "application/json".to_string())];
        self.request(input).await
    }

    /// Execute with the single forced-refresh retry.
    async fn request(&self, input: SignInput) -> Result<Value> {
        let token = self.authority.access_token().await?;
        match self.execute(&input, &token).await {
            Err(err) if err.is_token_invalid() => {
                tracing::info!("platform rejected token, refreshing and retrying once");
                let fresh = self.authority.force_refresh().await?;
                self.execute(&input, &fresh.access_token).await
            }
            other => other,
        }
    }

    async fn execute(&self, input: &SignInput, token: &str) -> Result<Value> {
        let method = reqwest::Method::from_bytes(input.method.as_bytes()).map_err(|_| {
            CloudError::Api {
                code: -1,
                msg: format!("unsupported method {}", input.method),
            }
        })?;
        let url = format!(
            "{}{}",
            self.authority
                .credentials()
                .base_url
                .as_str()
                .trim_end_matches('/'),
            input.path_with_query()
        );
        tracing::debug!("{} {}", input.method, url);

        let mut req = self.http.request(method, &url);
        for (name, value) in self.authority.signed_headers(Some(token), input) {
            req = req.header(name.as_str(), value.as_str());
        }
        if !input.signed_headers.is_empty() {
            for (name, value) in &input.signed_headers {
                req = req.header(name.as_str(), value.as_str());
            }
            let names = input
                .signed_headers
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(":");
            req = req.header("Signature-Headers", names);
        }
        if !input.body.is_empty() {
            req = req.body(input.body.clone());
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        decode_envelope(&text, status)
    }
}

/// Decode a response body into its `result` payload, mapping business
/// failures onto the error taxonomy.
fn decode_envelope(text: &str, http_status: u16) -> Result<Value> {
    let value: Value = serde_json::from_str(text).map_err(|_| CloudError::Api {
        code: i64::from(http_status),
        msg: format!("unparseable response: {}", truncate(text)),
    })?;

    let success = value
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if success {
        return Ok(value.get("result").cloned().unwrap_or(Value::Null));
    }

    let code = value.get("code").and_then(Value::as_i64).unwrap_or(-1);
    let msg = value
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    if TOKEN_INVALID_CODES.contains(&code) || text.contains(TOKEN_INVALID_MARKER) {
        return Err(CloudError::TokenInvalid { code });
    }
    Err(CloudError::Api { code, msg })
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.len() <= LIMIT {
        text.to_string()
    } else {
        let mut end = LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
