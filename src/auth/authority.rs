//! The token authority
//!
//! Owns the one live [`TokenRecord`] and produces a currently-valid
//! bearer token on demand, re-acquiring transparently when expired.
//! A background loop can keep the token fresh for long-running
//! sessions. All state is instance-owned and shared through a
//! cheap-to-clone handle; there are no process-wide singletons.

use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::EnvStore;
use crate::error::{CloudError, Result};
use crate::models::{ApiResponse, TokenGrant};

use super::sign::{self, SignInput, SignVersion, SIGN_METHOD};
use super::tokens::{unix_now, unix_now_millis, IssuedWith, TokenRecord};
use super::Credentials;

const TOKEN_PATH: &str = "/v1.0/token";

/// How long a single request may take before the client gives up.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on the failure backoff: interval * 2^4.
const MAX_BACKOFF_SHIFT: u32 = 4;

struct RefreshTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

struct Inner {
    creds: Credentials,
    sign_version: SignVersion,
    http: reqwest::Client,
    /// The live record. Held only for reads and swap-ins, never
    /// across an await; the network round trip happens outside it.
    token: RwLock<Option<TokenRecord>>,
    store: Mutex<EnvStore>,
    /// Serialises concurrent acquisitions so only one network
    /// round trip is in flight at a time.
    refresh_gate: tokio::sync::Mutex<()>,
    /// Background refresh loop; `Some` while running.
    refresh_task: Mutex<Option<RefreshTask>>,
}

/// Handle to the shared token state. Clone freely; all clones see the
/// same record and the same refresh loop.
#[derive(Clone)]
pub struct TokenAuthority {
    inner: Arc<Inner>,
}

impl TokenAuthority {
    /// Build an authority over the given credentials and store. A
    /// token persisted by an earlier run is picked up immediately.
    pub fn new(creds: Credentials, store: EnvStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let token = TokenRecord::from_store(&store);
        if token.is_some() {
            tracing::debug!("loaded persisted token from {}", store.path().display());
        }
        Ok(Self {
            inner: Arc::new(Inner {
                creds,
                sign_version: SignVersion::default(),
                http,
                token: RwLock::new(token),
                store: Mutex::new(store),
                refresh_gate: tokio::sync::Mutex::new(()),
                refresh_task: Mutex::new(None),
            }),
        })
    }

    /// Build an authority from the default env store.
    pub fn load(sign_version: SignVersion) -> Result<Self> {
        let store = EnvStore::load()?;
        let creds = Credentials::from_store(&store)?;
        Ok(Self::new(creds, store)?.with_sign_version(sign_version))
    }

    /// Select the legacy signing recipe. Only useful against cloud
    /// projects created before the 2021 signature update.
    pub fn with_sign_version(mut self, version: SignVersion) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.sign_version = version,
            // Handles already shared; keep the existing version.
            None => tracing::warn!("sign version can only be set before sharing the authority"),
        }
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.creds
    }

    /// Snapshot of the current record, valid or not.
    pub fn current_token(&self) -> Option<TokenRecord> {
        self.inner.token.read().unwrap().clone()
    }

    /// True when no token is held or the held one has expired.
    pub fn is_token_expired(&self) -> bool {
        self.valid_token().is_none()
    }

    fn valid_token(&self) -> Option<TokenRecord> {
        let guard = self.inner.token.read().unwrap();
        guard.as_ref().filter(|t| !t.is_expired()).cloned()
    }

    /// Produce a valid bearer token, acquiring one from the platform
    /// only when the cached record is absent or expired.
    pub async fn acquire_token(&self) -> Result<TokenRecord> {
        if let Some(record) = self.valid_token() {
            return Ok(record);
        }
        let _gate = self.inner.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(record) = self.valid_token() {
            return Ok(record);
        }
        self.fetch_token().await
    }

    /// Discard the cached record and acquire a fresh one. Used by the
    /// one-shot retry after the platform reports the token invalid.
    pub async fn force_refresh(&self) -> Result<TokenRecord> {
        let _gate = self.inner.refresh_gate.lock().await;
        *self.inner.token.write().unwrap() = None;
        self.fetch_token().await
    }

    /// Convenience accessor for collaborators that only need the
    /// bearer string.
    pub async fn access_token(&self) -> Result<String> {
        Ok(self.acquire_token().await?.access_token)
    }

    /// Headers required on a signed call, computed fresh (timestamp,
    /// nonce, signature) for the given request shape.
    pub fn signed_headers(
        &self,
        access_token: Option<&str>,
        input: &SignInput,
    ) -> Vec<(String, String)> {
        let creds = &self.inner.creds;
        let t = unix_now_millis();
        let nonce = Uuid::new_v4().to_string();
        let sign = sign::signature(
            &creds.client_secret,
            &creds.client_id,
            access_token,
            &t,
            self.inner.sign_version,
            input,
        );
        let mut headers = vec![
            ("client_id".to_string(), creds.client_id.clone()),
            ("sign".to_string(), sign),
            ("t".to_string(), t),
            ("sign_method".to_string(), SIGN_METHOD.to_string()),
            ("nonce".to_string(), nonce),
        ];
        match access_token {
            Some(token) => headers.push(("access_token".to_string(), token.to_string())),
            // Token-issuance quirk: the secret travels as a header
            // when no token is held yet.
            None => headers.push(("secret".to_string(), creds.client_secret.clone())),
        }
        headers
    }

    /// Signed GET against the token-issuance endpoint, then swap-in
    /// and persistence of the new record.
    async fn fetch_token(&self) -> Result<TokenRecord> {
        let inner = &self.inner;
        let input = SignInput::get(TOKEN_PATH).with_query(vec![("grant_type".into(), "1".into())]);

        let t = unix_now_millis();
        let nonce = Uuid::new_v4().to_string();
        let sign = sign::signature(
            &inner.creds.client_secret,
            &inner.creds.client_id,
            None,
            &t,
            inner.sign_version,
            &input,
        );

        let url = format!(
            "{}{}",
            inner.creds.base_url.as_str().trim_end_matches('/'),
            input.path_with_query()
        );
        tracing::debug!("GET {}", url);

        let resp = inner
            .http
            .get(&url)
            .header("client_id", &inner.creds.client_id)
            .header("sign", &sign)
            .header("t", &t)
            .header("sign_method", SIGN_METHOD)
            .header("nonce", &nonce)
            .header("secret", &inner.creds.client_secret)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CloudError::Auth(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let envelope: ApiResponse<TokenGrant> = resp.json().await?;
        if !envelope.success {
            return Err(CloudError::Auth(match envelope.code {
                Some(code) => format!("{} (code {})", envelope.error_msg(), code),
                None => envelope.error_msg(),
            }));
        }
        let grant = envelope
            .result
            .ok_or_else(|| CloudError::Auth("token response missing result".into()))?;

        let expire_time = grant.expire_time;
        let record = TokenRecord {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: unix_now() + expire_time as f64,
            issued_with: IssuedWith {
                t,
                nonce,
                sign,
                sign_method: SIGN_METHOD.to_string(),
            },
        };

        *inner.token.write().unwrap() = Some(record.clone());
        {
            let mut store = inner.store.lock().unwrap();
            record.persist(&mut store);
            store.save()?;
        }

        tracing::info!("access token acquired (valid for {} s)", expire_time);
        Ok(record)
    }

    /// Start the background refresh loop. Returns false (and does
    /// nothing) when a loop is already running. The loop checks
    /// expiry once per interval, re-acquires when needed, and backs
    /// off exponentially on consecutive failures.
    pub fn start_refresh(&self, interval: Duration) -> bool {
        let mut slot = self.inner.refresh_task.lock().unwrap();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                tracing::debug!("refresh loop already running");
                return false;
            }
        }

        let (shutdown, mut observed) = watch::channel(false);
        // The task holds only a weak reference: when every external
        // handle is gone the next tick exits instead of keeping the
        // state alive forever.
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut failures: u32 = 0;
            loop {
                let sleep_for = interval * (1u32 << failures.min(MAX_BACKOFF_SHIFT));
                tokio::select! {
                    _ = observed.changed() => break,
                    _ = tokio::time::sleep(sleep_for) => {}
                }
                let Some(inner) = weak.upgrade() else { break };
                let authority = TokenAuthority { inner };
                if !authority.is_token_expired() {
                    failures = 0;
                    continue;
                }
                match authority.acquire_token().await {
                    Ok(_) => {
                        failures = 0;
                        tracing::info!("token refreshed");
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::warn!("token refresh failed ({} in a row): {}", failures, e);
                    }
                }
            }
            tracing::debug!("refresh loop stopped");
        });

        *slot = Some(RefreshTask { handle, shutdown });
        true
    }

    /// True while a refresh loop is running.
    pub fn refresh_running(&self) -> bool {
        self.inner
            .refresh_task
            .lock()
            .unwrap()
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    /// Signal the refresh loop and wait for it to exit. No-op when
    /// the loop is not running.
    pub async fn stop_refresh(&self) {
        let task = self.inner.refresh_task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            let _ = task.handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Authority over an unroutable endpoint: any attempted network
    /// call fails, so a passing test proves none happened.
    fn offline_authority(dir: &tempfile::TempDir, token_ttl: Option<f64>) -> TokenAuthority {
        let path = dir.path().join("creds.env");
        let mut store = EnvStore::open(&path).unwrap();
        store.set(crate::config::KEY_ACCESS_ID, "client");
        store.set(crate::config::KEY_ACCESS_KEY, "secret");
        store.set(crate::config::KEY_BASE_URL, "http://127.0.0.1:9");
        if let Some(ttl) = token_ttl {
            store.set(crate::config::KEY_ACCESS_TOKEN, "cached-token");
            store.set(
                crate::config::KEY_TOKEN_EXPIRY_TIME,
                &(unix_now() + ttl).to_string(),
            );
        }
        store.save().unwrap();
        let creds = Credentials::from_store(&store).unwrap();
        TokenAuthority::new(creds, store).unwrap()
    }

    #[tokio::test]
    async fn test_acquire_skips_network_while_token_valid() {
        let dir = tempfile::tempdir().unwrap();
        let authority = offline_authority(&dir, Some(3600.0));

        let record = authority.acquire_token().await.unwrap();
        assert_eq!(record.access_token, "cached-token");
    }

    #[tokio::test]
    async fn test_expired_token_reports_expired() {
        let dir = tempfile::tempdir().unwrap();
        let authority = offline_authority(&dir, Some(-10.0));
        assert!(authority.is_token_expired());

        // And the expired path actually reaches for the network.
        let err = authority.acquire_token().await.unwrap_err();
        assert!(matches!(err, CloudError::Network(_)));
    }

    #[tokio::test]
    async fn test_missing_token_reports_expired() {
        let dir = tempfile::tempdir().unwrap();
        let authority = offline_authority(&dir, None);
        assert!(authority.is_token_expired());
    }

    #[tokio::test]
    async fn test_refresh_loop_start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let authority = offline_authority(&dir, Some(3600.0));

        assert!(authority.start_refresh(Duration::from_millis(10)));
        assert!(!authority.start_refresh(Duration::from_millis(10)));
        assert!(authority.refresh_running());

        authority.stop_refresh().await;
        assert!(!authority.refresh_running());

        // A stopped loop can be started again.
        assert!(authority.start_refresh(Duration::from_millis(10)));
        authority.stop_refresh().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let authority = offline_authority(&dir, None);
        authority.stop_refresh().await;
    }

    #[tokio::test]
    async fn test_refresh_loop_leaves_valid_token_alone() {
        let dir = tempfile::tempdir().unwrap();
        let authority = offline_authority(&dir, Some(3600.0));

        authority.start_refresh(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(40)).await;
        authority.stop_refresh().await;

        let record = authority.current_token().unwrap();
        assert_eq!(record.access_token, "cached-token");
    }
}
