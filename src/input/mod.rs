//! Input sources for the bridge.
//!
//! Current input sources:
//! - `mqtt`: IR readings pushed by the hub over MQTT

pub mod mqtt;
