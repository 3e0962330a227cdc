//! Momentary switch that sends an IR code when turned on.
//!
//! The switch does not hold an on/off state of its own. Turning it on sends
//! the code, shows `on` for one scheduler pass, then drops back to `off`.

use super::Entity;
use crate::error::Result;
use crate::hub::IrHubClient;
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::watch;

pub struct SendIrSwitch {
    name: String,
    unique_id: String,
    client: Arc<IrHubClient>,
    state: AtomicBool,
    version: AtomicU32,
    changes: watch::Sender<bool>,
}

impl SendIrSwitch {
    pub fn new(client: Arc<IrHubClient>, entry_id: &str) -> Self {
        Self::with_identifier(client, entry_id, "send_ir")
    }

    pub fn with_identifier(client: Arc<IrHubClient>, entry_id: &str, identifier: &str) -> Self {
        let (changes, _) = watch::channel(false);
        Self {
            name: format!("Tasmota IR Send ({})", client.config().host),
            unique_id: format!("{}_{}", entry_id, identifier),
            client,
            state: AtomicBool::new(false),
            version: AtomicU32::new(0),
            changes,
        }
    }

    pub fn is_on(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    /// Observe on/off transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.changes.subscribe()
    }

    /// Send `raw` and pulse the switch. A missing or empty code does nothing.
    pub async fn turn_on(&self, raw: Option<&str>) -> Result<()> {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            debug!("[Switch] {} turned on without a code, ignoring", self.unique_id);
            return Ok(());
        };

        self.client.send_ir(raw).await?;

        self.set(true);
        tokio::task::yield_now().await;
        self.set(false);
        Ok(())
    }

    pub fn turn_off(&self) {
        self.set(false);
    }

    fn set(&self, value: bool) {
        let old = self.state.swap(value, Ordering::SeqCst);
        if old != value {
            self.version.fetch_add(1, Ordering::SeqCst);
            self.changes.send_replace(value);
        }
    }
}

impl Entity for SendIrSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }
}
