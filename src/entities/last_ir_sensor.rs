//! Sensor exposing the last IR code seen by the hub.

use super::Entity;
use crate::coordinator::{CoordinatorData, IrCoordinator, UNKNOWN_DEVICE_TYPE};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::watch;

pub const ATTR_RAW: &str = "raw";
pub const ATTR_PAYLOAD: &str = "payload";

/// State and attributes as written out to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    /// Device type of the last reading, `None` before any reading.
    pub state: Option<String>,
    pub attributes: Value,
}

pub struct LastIrSensor {
    name: String,
    unique_id: String,
    coordinator: Arc<IrCoordinator>,
}

impl LastIrSensor {
    pub fn new(coordinator: Arc<IrCoordinator>, entry_id: &str) -> Self {
        Self {
            name: format!("Tasmota IR Last ({})", coordinator.client().config().host),
            unique_id: format!("{}_last_ir", entry_id),
            coordinator,
        }
    }

    pub fn state(&self) -> Option<String> {
        state_of(&self.coordinator.data())
    }

    pub fn attributes(&self) -> Value {
        attributes_of(&self.coordinator.data())
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        snapshot_of(&self.coordinator.data())
    }

    /// Stream of snapshots, one per coordinator update.
    pub fn updates(&self) -> SensorUpdates {
        SensorUpdates {
            rx: self.coordinator.subscribe(),
        }
    }
}

impl Entity for LastIrSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn version(&self) -> u32 {
        self.coordinator.version()
    }
}

pub struct SensorUpdates {
    rx: watch::Receiver<CoordinatorData>,
}

impl SensorUpdates {
    /// Wait for the next coordinator update. Returns `None` once the
    /// coordinator is gone.
    pub async fn next(&mut self) -> Option<SensorSnapshot> {
        self.rx.changed().await.ok()?;
        Some(snapshot_of(&self.rx.borrow_and_update()))
    }
}

fn state_of(data: &CoordinatorData) -> Option<String> {
    data.as_ref().map(|reading| {
        if reading.device_type.is_empty() {
            UNKNOWN_DEVICE_TYPE.to_string()
        } else {
            reading.device_type.clone()
        }
    })
}

fn attributes_of(data: &CoordinatorData) -> Value {
    match data {
        Some(reading) => json!({
            ATTR_RAW: reading.raw,
            ATTR_PAYLOAD: reading.raw_payload,
        }),
        None => json!({ ATTR_RAW: null, ATTR_PAYLOAD: null }),
    }
}

fn snapshot_of(data: &CoordinatorData) -> SensorSnapshot {
    SensorSnapshot {
        state: state_of(data),
        attributes: attributes_of(data),
    }
}
