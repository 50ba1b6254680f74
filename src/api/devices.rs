//! Device listing endpoints
//!
//! Two endpoints cover the account inventory: the associated-users
//! listing returns every device linked to the project, while the
//! iot-03 listing filters by cloud user id. Both paginate via
//! `last_row_key`/`has_more`, and their field sets overlap without
//! matching, so pages are merged device-by-device.

use anyhow::Result;
use serde_json::Value;

use crate::config::{self, EnvStore};
use crate::models::Device;

use super::client::CloudClient;

const ALL_DEVICES_PATH: &str = "/v1.0/iot-01/associated-users/devices";
const BY_USER_PATH: &str = "/v1.3/iot-03/devices";

/// List devices and print them; optionally persist one as the
/// default target.
pub async fn list_devices(client: &CloudClient, uid: Option<&str>, select: Option<&str>) -> Result<()> {
    let devices = list_devices_data(client, uid).await?;

    println!("\nDevices:");
    println!("{:-<60}", "");
    if devices.is_empty() {
        println!("  (no devices found)");
    }
    for dev in &devices {
        let name = if dev.name.is_empty() { "(unnamed)" } else { &dev.name };
        let online = match dev.extra.get("online").and_then(Value::as_bool) {
            Some(true) => "online",
            Some(false) => "offline",
            None => "",
        };
        println!("  {:<30} {:<24} {}", name, dev.id, online);
    }

    if let Some(id) = select {
        if !devices.iter().any(|d| d.id == id) {
            tracing::warn!("device {} not in the listing; selecting anyway", id);
        }
        let mut store = EnvStore::load()?;
        store.set(config::KEY_DEVICE_ID, id);
        store.save()?;
        println!("\nSelected device {} as default target.", id);
    }

    Ok(())
}

/// Fetch the full device inventory, following pagination.
pub async fn list_devices_data(client: &CloudClient, uid: Option<&str>) -> Result<Vec<Device>> {
    let (path, mut query) = match uid {
        Some(uid) => (
            BY_USER_PATH,
            vec![
                ("page_size".to_string(), "75".to_string()),
                ("source_type".to_string(), "tuyaUser".to_string()),
                ("source_id".to_string(), uid.to_string()),
            ],
        ),
        None => (
            ALL_DEVICES_PATH,
            vec![("size".to_string(), "50".to_string())],
        ),
    };

    let mut devices: Vec<Device> = Vec::new();
    let mut fetches = 0u32;
    loop {
        let result = client.get(path, query.clone()).await?;
        fetches += 1;
        let page = parse_page(&result);
        merge_devices(&mut devices, page.devices);

        match page.last_row_key {
            Some(key) if page.has_more => {
                query.retain(|(k, _)| k != "last_row_key");
                query.push(("last_row_key".to_string(), key));
            }
            _ => break,
        }
    }

    tracing::debug!("fetched {} devices in {} page(s)", devices.len(), fetches);
    Ok(devices)
}

/// One page of a listing response.
struct Page {
    devices: Vec<Device>,
    has_more: bool,
    last_row_key: Option<String>,
}

/// The by-user listing puts rows under `list`, the all-devices one
/// under `devices`.
fn parse_page(result: &Value) -> Page {
    let rows = result
        .get("list")
        .or_else(|| result.get("devices"))
        .and_then(Value::as_array);
    let devices = rows
        .map(|arr| {
            arr.iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    Page {
        devices,
        has_more: result
            .get("has_more")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        last_row_key: result
            .get("last_row_key")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Merge `incoming` into `existing`: match on id, keep non-empty
/// existing fields, fill empty or missing ones, append unseen
/// devices. Rows without an id are dropped.
pub fn merge_devices(existing: &mut Vec<Device>, incoming: Vec<Device>) {
    for new_dev in incoming {
        if new_dev.id.is_empty() {
            continue;
        }
        match existing.iter_mut().find(|d| d.id == new_dev.id) {
            Some(dev) => {
                if dev.name.is_empty() && !new_dev.name.is_empty() {
                    dev.name = new_dev.name;
                }
                for (key, value) in new_dev.extra {
                    if dev.field_is_empty(&key) {
                        dev.extra.insert(key, value);
                    }
                }
            }
            None => existing.push(new_dev),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device(value: Value) -> Device {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_merge_fills_empty_fields_keeps_nonempty() {
        let mut existing = vec![device(json!({"id": "1", "name": "A"}))];
        let incoming = vec![device(json!({"id": "1", "name": "", "room": "X"}))];

        merge_devices(&mut existing, incoming);

        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].name, "A");
        assert_eq!(existing[0].extra["room"], "X");
    }

    #[test]
    fn test_merge_appends_unseen_devices() {
        let mut existing = vec![device(json!({"id": "1", "name": "A"}))];
        let incoming = vec![device(json!({"id": "2", "name": "B"}))];

        merge_devices(&mut existing, incoming);

        assert_eq!(existing.len(), 2);
        assert_eq!(existing[1].id, "2");
    }

    #[test]
    fn test_merge_skips_rows_without_id() {
        let mut existing = Vec::new();
        let incoming = vec![device(json!({"id": "", "name": "ghost"}))];

        merge_devices(&mut existing, incoming);
        assert!(existing.is_empty());
    }

    #[test]
    fn test_merge_does_not_overwrite_existing_value() {
        let mut existing = vec![device(json!({"id": "1", "room": "kitchen"}))];
        let incoming = vec![device(json!({"id": "1", "room": "garage"}))];

        merge_devices(&mut existing, incoming);
        assert_eq!(existing[0].extra["room"], "kitchen");
    }

    #[test]
    fn test_parse_page_devices_key() {
        let result = json!({
            "devices": [{"id": "a", "name": "Lamp"}],
            "has_more": false,
            "total": 1
        });
        let page = parse_page(&result);
        assert_eq!(page.devices.len(), 1);
        assert!(!page.has_more);
        assert!(page.last_row_key.is_none());
    }

    #[test]
    fn test_parse_page_list_key_with_continuation() {
        let result = json!({
            "list": [{"id": "a"}, {"id": "b"}],
            "has_more": true,
            "last_row_key": "row-42"
        });
        let page = parse_page(&result);
        assert_eq!(page.devices.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.last_row_key.as_deref(), Some("row-42"));
    }

    #[test]
    fn test_parse_page_tolerates_missing_rows() {
        let page = parse_page(&json!({"total": 0}));
        assert!(page.devices.is_empty());
        assert!(!page.has_more);
    }
}
