//! Entities exposed for each hub entry.

pub mod last_ir_sensor;
pub mod send_ir_switch;
mod traits;

pub use last_ir_sensor::{LastIrSensor, SensorSnapshot, SensorUpdates};
pub use send_ir_switch::SendIrSwitch;
pub use traits::Entity;
