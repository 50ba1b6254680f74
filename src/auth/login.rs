//! Login, logout, status and credential management flows

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use url::Url;

use crate::config::{self, EnvStore};

use super::sign::SignVersion;
use super::tokens::TokenRecord;
use super::TokenAuthority;

/// Acquire (or reuse) an access token.
pub async fn login(force: bool, sign_version: SignVersion) -> Result<()> {
    let authority = TokenAuthority::load(sign_version)?;

    if !force {
        if let Some(record) = authority.current_token().filter(|r| !r.is_expired()) {
            println!(
                "Already logged in (token valid until {}). Use --force to re-acquire.",
                format_expiry(record.expires_at)
            );
            return Ok(());
        }
    }

    let acquired = if force {
        authority.force_refresh().await
    } else {
        authority.acquire_token().await
    };
    let record = acquired.context("Failed to acquire access token")?;

    println!(
        "Login successful. Token valid until {}.",
        format_expiry(record.expires_at)
    );
    Ok(())
}

/// Clear all token state. Credentials are kept, so this works even
/// with an incomplete store.
pub async fn logout() -> Result<()> {
    let mut store = EnvStore::load()?;
    clear_token_keys(&mut store);
    store.save()?;
    println!("Logged out.");
    Ok(())
}

/// Remove every token-related key, leaving credentials and the
/// selected device untouched.
fn clear_token_keys(store: &mut EnvStore) {
    for key in [
        config::KEY_ACCESS_TOKEN,
        config::KEY_REFRESH_TOKEN,
        config::KEY_TIMESTAMP,
        config::KEY_SIGNATURE,
        config::KEY_SIGN_METHOD,
        config::KEY_NONCE,
        config::KEY_TOKEN_EXPIRY_TIME,
    ] {
        store.unset(key);
    }
}

/// Display stored credentials and token state.
pub async fn status() -> Result<()> {
    let store = EnvStore::load()?;

    println!("Store:        {}", store.path().display());

    let creds_complete = store.get(config::KEY_ACCESS_ID).is_some()
        && store.get(config::KEY_ACCESS_KEY).is_some()
        && store.get(config::KEY_BASE_URL).is_some();
    if creds_complete {
        println!("Credentials:  present");
        if let Some(base) = store.get(config::KEY_BASE_URL) {
            println!("  endpoint:   {}", base);
        }
    } else {
        println!("Credentials:  incomplete");
    }

    match TokenRecord::from_store(&store) {
        Some(record) if !record.is_expired() => {
            println!("Access token: valid");
            println!("  expires_at: {}", format_expiry(record.expires_at));
            println!("  expires_in: {} s", record.expires_in() as u64);
        }
        Some(_) => println!("Access token: expired"),
        None => println!("Access token: none"),
    }

    match store.get(config::KEY_REFRESH_TOKEN) {
        Some(_) => println!("Refresh tok:  present"),
        None => println!("Refresh tok:  none"),
    }

    if let Some(t) = store.get(config::KEY_TIMESTAMP) {
        println!(
            "Last issued:  t={} method={}",
            t,
            store.get(config::KEY_SIGN_METHOD).unwrap_or("?")
        );
    }

    match store.get(config::KEY_DEVICE_ID) {
        Some(id) => println!("Device:       {}", id),
        None => println!("Device:       none selected"),
    }

    if TokenRecord::from_store(&store).is_none() {
        println!("\nRun 'tuya-cli login' to authenticate.");
    }

    Ok(())
}

/// Save cloud project credentials to the env store.
pub fn set_credentials(
    access_id: Option<String>,
    access_key: Option<String>,
    base_url: Option<String>,
) -> Result<()> {
    let mut store = EnvStore::load()?;

    if let Some(base) = &base_url {
        Url::parse(base).with_context(|| format!("invalid base URL: {}", base))?;
        store.set(config::KEY_BASE_URL, base);
    }
    if let Some(id) = &access_id {
        store.set(config::KEY_ACCESS_ID, id);
    }
    if let Some(key) = &access_key {
        store.set(config::KEY_ACCESS_KEY, key);
    }

    store.save()?;
    println!("Credentials saved to {}.", store.path().display());

    let complete = store.get(config::KEY_ACCESS_ID).is_some()
        && store.get(config::KEY_ACCESS_KEY).is_some()
        && store.get(config::KEY_BASE_URL).is_some();
    if !complete {
        println!("Note: access id, access key and base URL are all required before login.");
    }
    Ok(())
}

/// Run the background refresh loop until interrupted.
pub async fn watch(interval_secs: u64, sign_version: SignVersion) -> Result<()> {
    let authority = TokenAuthority::load(sign_version)?;
    // Fail fast on bad credentials rather than inside the loop.
    let record = authority
        .acquire_token()
        .await
        .context("Failed to acquire access token")?;
    println!(
        "Token valid until {}. Watching expiry (Ctrl-C to stop)...",
        format_expiry(record.expires_at)
    );

    authority.start_refresh(std::time::Duration::from_secs(interval_secs));
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    authority.stop_refresh().await;
    debug_assert!(!authority.refresh_running());
    println!("Stopped.");
    Ok(())
}

/// Human-readable local time for a unix-seconds expiry stamp.
pub fn format_expiry(expires_at: f64) -> String {
    match Local.timestamp_opt(expires_at as i64, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => format!("unix {}", expires_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_token_keys_keeps_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EnvStore::open(dir.path().join("creds.env")).unwrap();
        store.set(config::KEY_ACCESS_ID, "client");
        store.set(config::KEY_ACCESS_TOKEN, "tok");
        store.set(config::KEY_TOKEN_EXPIRY_TIME, "123.0");
        store.set(config::KEY_NONCE, "n");
        store.set(config::KEY_DEVICE_ID, "dev1");

        clear_token_keys(&mut store);

        assert!(store.get(config::KEY_ACCESS_TOKEN).is_none());
        assert!(store.get(config::KEY_TOKEN_EXPIRY_TIME).is_none());
        assert!(store.get(config::KEY_NONCE).is_none());
        assert_eq!(store.get(config::KEY_ACCESS_ID), Some("client"));
        assert_eq!(store.get(config::KEY_DEVICE_ID), Some("dev1"));
    }
}
