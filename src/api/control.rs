//! Device control endpoint

use anyhow::Result;
use serde_json::{json, Value};

use crate::models::DeviceCommand;

use super::client::CloudClient;

/// Toggle a boolean function (a switch) on or off.
pub async fn switch(client: &CloudClient, device_id: &str, code: &str, on: bool) -> Result<()> {
    let commands = vec![DeviceCommand {
        code: code.to_string(),
        value: Value::Bool(on),
    }];
    send_commands(client, device_id, &commands).await?;
    println!(
        "Command sent: {} = {}",
        code,
        if on { "on" } else { "off" }
    );
    Ok(())
}

/// POST a command batch to a device.
pub async fn send_commands(
    client: &CloudClient,
    device_id: &str,
    commands: &[DeviceCommand],
) -> Result<()> {
    let path = format!("/v1.0/iot-03/devices/{}/commands", device_id);
    let body = json!({ "commands": commands });
    client.post_json(&path, &body).await?;
    Ok(())
}
