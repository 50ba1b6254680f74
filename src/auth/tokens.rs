//! Token record storage and expiry tracking

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{self, EnvStore};

/// Signing material used on the issuance call, persisted alongside
/// the token for diagnostics and interop with the platform's tooling.
#[derive(Debug, Clone, Default)]
pub struct IssuedWith {
    /// Timestamp (`t` header) in milliseconds, as sent.
    pub t: String,
    pub nonce: String,
    pub sign: String,
    pub sign_method: String,
}

/// The one live bearer token. Replaced wholesale on every refresh.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Wall-clock unix seconds after which the token is invalid:
    /// issuance time plus the server-reported `expire_time`.
    pub expires_at: f64,
    pub issued_with: IssuedWith,
}

impl TokenRecord {
    /// Pure expiry check against an explicit clock reading.
    pub fn is_expired_at(&self, now: f64) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }

    /// Seconds of validity left, clamped at zero.
    pub fn expires_in(&self) -> f64 {
        (self.expires_at - unix_now()).max(0.0)
    }

    /// Rebuild a record persisted by an earlier run, so a restart can
    /// reuse a still-valid token without re-authenticating.
    pub fn from_store(store: &EnvStore) -> Option<Self> {
        let access_token = store.get(config::KEY_ACCESS_TOKEN)?.to_string();
        let expires_at = store.get_f64(config::KEY_TOKEN_EXPIRY_TIME)?;
        Some(Self {
            access_token,
            refresh_token: store.get(config::KEY_REFRESH_TOKEN).map(str::to_string),
            expires_at,
            issued_with: IssuedWith {
                t: store.get(config::KEY_TIMESTAMP).unwrap_or_default().to_string(),
                nonce: store.get(config::KEY_NONCE).unwrap_or_default().to_string(),
                sign: store.get(config::KEY_SIGNATURE).unwrap_or_default().to_string(),
                sign_method: store
                    .get(config::KEY_SIGN_METHOD)
                    .unwrap_or_default()
                    .to_string(),
            },
        })
    }

    /// Write every field of the record into the store (in memory;
    /// the caller saves).
    pub fn persist(&self, store: &mut EnvStore) {
        store.set(config::KEY_ACCESS_TOKEN, &self.access_token);
        if let Some(refresh) = &self.refresh_token {
            store.set(config::KEY_REFRESH_TOKEN, refresh);
        }
        store.set(config::KEY_TOKEN_EXPIRY_TIME, &self.expires_at.to_string());
        store.set(config::KEY_TIMESTAMP, &self.issued_with.t);
        store.set(config::KEY_NONCE, &self.issued_with.nonce);
        store.set(config::KEY_SIGNATURE, &self.issued_with.sign);
        store.set(config::KEY_SIGN_METHOD, &self.issued_with.sign_method);
    }
}

/// Current wall clock as unix seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

/// Current wall clock as milliseconds, the `t` header value.
pub fn unix_now_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis()
        .to_string()
}
