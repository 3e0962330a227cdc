//! User-invocable actions registered for each hub entry.

use crate::error::{BridgeError, Result};
use serde_json::Value;

pub const DOMAIN: &str = "tasmota_ir_hub";
pub const SERVICE_SEND_IR: &str = "send_ir";
pub const SERVICE_LEARN_IR: &str = "learn_ir";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    /// Transmit a raw code.
    SendIr { raw: String },
    /// Put the hub into learn mode.
    LearnIr,
}

impl ServiceCall {
    /// Build a call from a service name and its JSON data.
    pub fn from_parts(service: &str, data: &Value) -> Result<Self> {
        match service {
            SERVICE_SEND_IR => {
                let raw = data
                    .get("raw")
                    .and_then(Value::as_str)
                    .filter(|raw| !raw.is_empty())
                    .ok_or_else(|| {
                        BridgeError::InvalidServiceCall(format!(
                            "{}.{} requires a non-empty 'raw' code",
                            DOMAIN, SERVICE_SEND_IR
                        ))
                    })?;
                Ok(ServiceCall::SendIr {
                    raw: raw.to_string(),
                })
            }
            SERVICE_LEARN_IR => Ok(ServiceCall::LearnIr),
            other => Err(BridgeError::InvalidServiceCall(format!(
                "unknown service {}.{}",
                DOMAIN, other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceCall::SendIr { .. } => SERVICE_SEND_IR,
            ServiceCall::LearnIr => SERVICE_LEARN_IR,
        }
    }
}
