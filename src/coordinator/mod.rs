//! Data coordinator holding the last IR reading of one hub.
//!
//! Readings arrive by push (MQTT messages routed to
//! [`IrCoordinator::handle_mqtt_message`]). The periodic refresh exists for
//! both transports but the hub has no endpoint to poll, so it only hands back
//! the cached reading.

mod reading;

pub use reading::{IrReading, UNKNOWN_DEVICE_TYPE};

use crate::error::{BridgeError, Result};
use crate::hub::IrHubClient;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bound on a single poll in HTTP mode.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Cached state shared with observers. `None` until the first reading.
pub type CoordinatorData = Option<IrReading>;

pub struct IrCoordinator {
    name: String,
    client: Arc<IrHubClient>,
    update_interval: Duration,
    data: watch::Sender<CoordinatorData>,
    /// Bumped on every new reading.
    version: AtomicU32,
    last_update_success: AtomicBool,
    last_update: RwLock<Option<DateTime<Utc>>>,
}

impl IrCoordinator {
    pub fn new(client: Arc<IrHubClient>) -> Self {
        let update_interval = client.config().scan_interval();
        let (data, _) = watch::channel(None);

        Self {
            name: format!("Tasmota IR Hub {}", client.config().host),
            client,
            update_interval,
            data,
            version: AtomicU32::new(0),
            last_update_success: AtomicBool::new(false),
            last_update: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Arc<IrHubClient> {
        &self.client
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Snapshot of the current reading.
    pub fn data(&self) -> CoordinatorData {
        self.data.borrow().clone()
    }

    /// Observe reading changes.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorData> {
        self.data.subscribe()
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.read()
    }

    /// Fetch the current reading.
    ///
    /// MQTT mode never polls. HTTP mode has nothing to query on the hub
    /// either, so both return the cached reading; the HTTP path is still
    /// bounded by [`POLL_TIMEOUT`].
    pub async fn refresh(&self) -> Result<CoordinatorData> {
        if self.client.use_mqtt() {
            return Ok(self.data());
        }

        tokio::time::timeout(POLL_TIMEOUT, self.poll_hub())
            .await
            .map_err(|_| {
                BridgeError::UpdateFailed(format!("poll timed out after {:?}", POLL_TIMEOUT))
            })?
    }

    async fn poll_hub(&self) -> Result<CoordinatorData> {
        Ok(self.data())
    }

    /// Run one refresh and record its outcome.
    ///
    /// The refresh only ever hands back the cache, so nothing is written
    /// back; a push landing mid-refresh must not be replaced by the older copy.
    pub async fn update(&self) -> Result<()> {
        match self.refresh().await {
            Ok(_) => {
                self.mark_updated(true);
                debug!("[Coordinator] {} refreshed", self.name);
                Ok(())
            }
            Err(e) => {
                self.mark_updated(false);
                Err(e)
            }
        }
    }

    /// Refresh run once while setting up the hub entry.
    pub async fn first_refresh(&self) -> Result<()> {
        self.update()
            .await
            .map_err(|e| BridgeError::SetupFailed(e.to_string()))
    }

    /// Spawn the periodic refresh loop. The first tick fires one interval
    /// from now since setup already ran [`first_refresh`](Self::first_refresh).
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let period = coordinator.update_interval;
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("[Coordinator] {} refresh loop stopped", coordinator.name);
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = coordinator.update().await {
                            warn!("[Coordinator] {} update failed: {}", coordinator.name, e);
                        }
                    }
                }
            }
        })
    }

    /// Handle an IR event pushed over MQTT.
    ///
    /// Parse failures are logged and dropped; the previous reading stays.
    pub fn handle_mqtt_message(&self, topic: &str, payload: &str) {
        match IrReading::parse(payload) {
            Ok(reading) => {
                info!(
                    "[Coordinator] IR received on {}: code={:?} type={}",
                    topic, reading.raw, reading.device_type
                );
                self.set_updated_data(reading);
            }
            Err(e) => {
                error!("[Coordinator] Failed to handle MQTT IR message on {}: {}", topic, e);
            }
        }
    }

    /// Replace the cached reading and notify observers.
    pub fn set_updated_data(&self, reading: IrReading) {
        self.data.send_replace(Some(reading));
        self.version.fetch_add(1, Ordering::SeqCst);
        self.mark_updated(true);
    }

    fn mark_updated(&self, success: bool) {
        self.last_update_success.store(success, Ordering::SeqCst);
        *self.last_update.write() = Some(Utc::now());
    }
}
