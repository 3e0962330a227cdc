//! MQTT input source for Tasmota IR hubs.
//!
//! Connects to the broker, subscribes to the hub's receive topic on every
//! connect and feeds IR readings into the coordinator. The same connection
//! publishes commands when the hub runs in MQTT mode.

mod client;
mod integration;

pub use client::{LinkStatus, MqttClient, MqttMessage};
pub use integration::MqttIntegration;
