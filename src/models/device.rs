//! Device entities returned by the listing and capability endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A device registered to the cloud account.
///
/// The two listing endpoints return overlapping but not identical
/// field sets, so everything beyond `id`/`name` is kept as raw JSON
/// and reconciled by the list merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Device {
    /// True when the named field is absent or empty on this device.
    pub fn field_is_empty(&self, key: &str) -> bool {
        match key {
            "id" => self.id.is_empty(),
            "name" => self.name.is_empty(),
            _ => match self.extra.get(key) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            },
        }
    }
}

/// One controllable capability of a device (an "instruction" in the
/// platform docs).
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceFunction {
    pub code: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// JSON-encoded value range / enum description.
    #[serde(default)]
    pub values: String,
    #[serde(default)]
    pub desc: Option<String>,
}

/// `result` payload of `GET /v1.0/iot-03/devices/{id}/functions`.
#[derive(Debug, Deserialize)]
pub struct DeviceFunctions {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub functions: Vec<DeviceFunction>,
}

/// One command in a control request body.
#[derive(Debug, Serialize)]
pub struct DeviceCommand {
    pub code: String,
    pub value: Value,
}
