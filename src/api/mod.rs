//! API client module for the Tuya cloud

pub mod client;
mod control;
mod devices;
mod functions;

use anyhow::{bail, Result};

use crate::auth::SignVersion;
use crate::config::{self, EnvStore};

use self::client::CloudClient;

/// List devices registered to the account (all, or by cloud user id)
pub async fn list_devices(
    uid: Option<&str>,
    select: Option<&str>,
    sign_version: SignVersion,
) -> Result<()> {
    let client = CloudClient::load(sign_version)?;
    devices::list_devices(&client, uid, select).await
}

/// Show the function set of a device
pub async fn show_functions(device_id: Option<String>, sign_version: SignVersion) -> Result<()> {
    let client = CloudClient::load(sign_version)?;
    let device_id = resolve_device_id(device_id)?;
    functions::show_functions(&client, &device_id).await
}

/// Toggle a device switch on or off
pub async fn switch(
    device_id: Option<String>,
    code: &str,
    on: bool,
    sign_version: SignVersion,
) -> Result<()> {
    let client = CloudClient::load(sign_version)?;
    let device_id = resolve_device_id(device_id)?;
    control::switch(&client, &device_id, code, on).await
}

/// Explicit device id, or the one persisted by `devices --select`.
fn resolve_device_id(device_id: Option<String>) -> Result<String> {
    if let Some(id) = device_id {
        return Ok(id);
    }
    let store = EnvStore::load()?;
    match store.get(config::KEY_DEVICE_ID) {
        Some(id) => Ok(id.to_string()),
        None => bail!("no device selected; pass a device id or run 'tuya-cli devices --select <id>'"),
    }
}
