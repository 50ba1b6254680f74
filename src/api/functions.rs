//! Device capability (functions) endpoint

use anyhow::{Context, Result};

use crate::models::DeviceFunctions;

use super::client::CloudClient;

/// Fetch and print the function set of a device.
pub async fn show_functions(client: &CloudClient, device_id: &str) -> Result<()> {
    let functions = functions_data(client, device_id).await?;

    println!("\nFunctions of {}:", device_id);
    println!("{:-<60}", "");
    if let Some(category) = &functions.category {
        println!("Category: {}", category);
    }
    if functions.functions.is_empty() {
        println!("  (no controllable functions)");
        return Ok(());
    }
    for func in &functions.functions {
        println!("  {:<20} {:<10} {}", func.code, func.kind, func.values);
        if let Some(desc) = func.desc.as_deref().filter(|d| !d.is_empty()) {
            println!("  {:<20} {}", "", desc);
        }
    }
    Ok(())
}

/// Fetch the structured function set.
pub async fn functions_data(client: &CloudClient, device_id: &str) -> Result<DeviceFunctions> {
    let path = format!("/v1.0/iot-03/devices/{}/functions", device_id);
    let result = client.get(&path, Vec::new()).await?;
    serde_json::from_value(result).context("Failed to parse device functions response")
}
