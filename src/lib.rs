//! Tasmota IR hub bridge library.
//!
//! Sends raw infrared codes to a Tasmota IR hub over HTTP or MQTT, keeps the
//! last code the hub received, and exposes both as entities.

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod entities;
pub mod error;
pub mod hub;
pub mod input;
pub mod services;
