//! Last observed IR reading and inbound payload parsing.

use crate::error::{BridgeError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Field names that may carry the received code, in lookup order.
const CODE_FIELDS: [&str; 3] = ["IR", "IRrecv", "raw"];

/// Field names that may carry the device type, in lookup order.
const DEVICE_TYPE_FIELDS: [&str; 2] = ["DeviceType", "Type"];

pub const UNKNOWN_DEVICE_TYPE: &str = "unknown";

/// Most recent IR code seen by the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrReading {
    /// Decoded code, if the payload carried one.
    pub raw: Option<String>,
    pub device_type: String,
    /// The payload as a key/value map. Opaque payloads are wrapped as `{"raw": <payload>}`.
    pub raw_payload: Map<String, Value>,
}

impl IrReading {
    /// Parse an inbound MQTT payload.
    ///
    /// JSON objects are read field by field. Anything that is not valid JSON
    /// is kept whole as an opaque payload with no decoded code. Valid JSON
    /// that is not an object is rejected.
    pub fn parse(payload: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(fields)) => Ok(Self::from_fields(fields)),
            Ok(other) => Err(BridgeError::InvalidPayload(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(_) => Ok(Self::opaque(payload)),
        }
    }

    fn from_fields(fields: Map<String, Value>) -> Self {
        let raw = first_truthy(&fields, &CODE_FIELDS).map(render);
        let device_type = first_truthy(&fields, &DEVICE_TYPE_FIELDS)
            .map(render)
            .unwrap_or_else(|| UNKNOWN_DEVICE_TYPE.to_string());

        Self {
            raw,
            device_type,
            raw_payload: fields,
        }
    }

    fn opaque(payload: &str) -> Self {
        let mut raw_payload = Map::new();
        raw_payload.insert("raw".to_string(), Value::String(payload.to_string()));

        Self {
            raw: None,
            device_type: UNKNOWN_DEVICE_TYPE.to_string(),
            raw_payload,
        }
    }
}

fn first_truthy<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| fields.get(*name))
        .find(|value| is_truthy(value))
}

/// Empty, zero, false and null values do not count as present.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
