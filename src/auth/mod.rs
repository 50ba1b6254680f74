//! Authentication for the Tuya cloud API
//!
//! Implements the platform's HMAC-SHA256 request-signing recipe and
//! the bearer-token lifecycle: acquisition, caching, persistence to
//! the env store, and periodic background refresh.

pub mod authority;
pub mod login;
pub mod sign;
pub mod tokens;

pub use authority::TokenAuthority;
pub use login::{login, logout, set_credentials, status, watch};
pub use sign::{SignInput, SignVersion, SIGN_METHOD};
pub use tokens::TokenRecord;

use url::Url;

use crate::config::{self, EnvStore};
use crate::error::{CloudError, Result};

/// Cloud project credentials, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Access ID of the cloud project.
    pub client_id: String,
    /// Access secret, the HMAC signing key.
    pub client_secret: String,
    /// Regional API endpoint, e.g. `https://openapi.tuyaeu.com`.
    pub base_url: Url,
}

impl Credentials {
    /// Load credentials from the env store. All three keys are
    /// required; a missing one is fatal at startup.
    pub fn from_store(store: &EnvStore) -> Result<Self> {
        let client_id = required(store, config::KEY_ACCESS_ID)?;
        let client_secret = required(store, config::KEY_ACCESS_KEY)?;
        let base = required(store, config::KEY_BASE_URL)?;
        let base_url = Url::parse(&base)
            .map_err(|e| CloudError::Config(format!("invalid {}: {}", config::KEY_BASE_URL, e)))?;
        Ok(Self {
            client_id,
            client_secret,
            base_url,
        })
    }
}

fn required(store: &EnvStore, key: &str) -> Result<String> {
    store.get(key).map(str::to_string).ok_or_else(|| {
        CloudError::Config(format!(
            "{} not set -- run 'tuya-cli set-credentials' first",
            key
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_require_all_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.env");
        std::fs::write(&path, "TUYA_ACCESS_ID=id\nTUYA_ACCESS_KEY=key\n").unwrap();

        let store = EnvStore::open(&path).unwrap();
        let err = Credentials::from_store(&store).unwrap_err();
        assert!(matches!(err, CloudError::Config(_)));
        assert!(err.to_string().contains(config::KEY_BASE_URL));
    }

    #[test]
    fn test_credentials_parse_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.env");
        std::fs::write(
            &path,
            "TUYA_ACCESS_ID=id\nTUYA_ACCESS_KEY=key\nTUYA_BASE_URL=https://openapi.tuyaeu.com\n",
        )
        .unwrap();

        let store = EnvStore::open(&path).unwrap();
        let creds = Credentials::from_store(&store).unwrap();
        assert_eq!(creds.base_url.host_str(), Some("openapi.tuyaeu.com"));
    }
}
