//! Lifecycle of one configured hub: setup, service dispatch and unload.

use crate::config::HubConfig;
use crate::coordinator::IrCoordinator;
use crate::entities::{LastIrSensor, SendIrSwitch};
use crate::error::{BridgeError, Result};
use crate::hub::{CommandPublisher, HttpTransport, IrHubClient, ReqwestTransport};
use crate::services::ServiceCall;
use log::{info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct HubEntry {
    entry_id: String,
    title: String,
    coordinator: Arc<IrCoordinator>,
    sensor: LastIrSensor,
    switch: SendIrSwitch,
    cancel: CancellationToken,
    refresh_task: JoinHandle<()>,
}

impl HubEntry {
    /// Set up an entry talking to the hub over `reqwest`.
    pub async fn setup(
        config: HubConfig,
        publisher: Option<Arc<dyn CommandPublisher>>,
    ) -> Result<Self> {
        Self::setup_with_transport(config, Arc::new(ReqwestTransport::new()), publisher).await
    }

    pub async fn setup_with_transport(
        config: HubConfig,
        http: Arc<dyn HttpTransport>,
        publisher: Option<Arc<dyn CommandPublisher>>,
    ) -> Result<Self> {
        config.validate()?;
        if config.use_mqtt() && publisher.is_none() {
            return Err(BridgeError::SetupFailed(
                "mqtt transport requires a broker connection".into(),
            ));
        }

        let entry_id = Uuid::new_v4().simple().to_string();
        let title = config.title();
        info!("Setting up {} (entry {})", title, entry_id);

        let client = Arc::new(IrHubClient::with_transport(config, http, publisher));
        let coordinator = Arc::new(IrCoordinator::new(client.clone()));
        coordinator.first_refresh().await?;

        let cancel = CancellationToken::new();
        let refresh_task = coordinator.start(cancel.child_token());

        let sensor = LastIrSensor::new(coordinator.clone(), &entry_id);
        let switch = SendIrSwitch::new(client, &entry_id);

        Ok(Self {
            entry_id,
            title,
            coordinator,
            sensor,
            switch,
            cancel,
            refresh_task,
        })
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn coordinator(&self) -> &Arc<IrCoordinator> {
        &self.coordinator
    }

    pub fn client(&self) -> &Arc<IrHubClient> {
        self.coordinator.client()
    }

    pub fn sensor(&self) -> &LastIrSensor {
        &self.sensor
    }

    pub fn switch(&self) -> &SendIrSwitch {
        &self.switch
    }

    pub async fn call_service(&self, call: ServiceCall) -> Result<()> {
        info!("[Service] {} called on {}", call.name(), self.title);
        match call {
            ServiceCall::SendIr { raw } => self.client().send_ir(&raw).await,
            ServiceCall::LearnIr => self.client().start_learn_mode().await,
        }
    }

    /// Stop background refreshes and release the HTTP session.
    pub async fn unload(self) {
        let HubEntry {
            title,
            coordinator,
            cancel,
            refresh_task,
            ..
        } = self;

        cancel.cancel();
        if let Err(e) = refresh_task.await {
            warn!("Refresh task for {} ended abnormally: {}", title, e);
        }
        coordinator.client().close().await;
        info!("Unloaded {}", title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportMode;
    use crate::entities::Entity;
    use crate::hub::testing::{FakeHttp, FakePublisher};

    #[tokio::test]
    async fn test_setup_creates_entities() {
        let entry = HubEntry::setup_with_transport(
            HubConfig::new("10.0.0.50"),
            Arc::new(FakeHttp::ok()),
            None,
        )
        .await
        .unwrap();

        assert_eq!(entry.title(), "Tasmota IR Hub (10.0.0.50)");
        assert_eq!(
            entry.sensor().unique_id(),
            format!("{}_last_ir", entry.entry_id())
        );
        assert_eq!(
            entry.switch().unique_id(),
            format!("{}_send_ir", entry.entry_id())
        );
        assert_eq!(entry.sensor().state(), None);
        assert!(entry.coordinator().last_update_success());

        entry.unload().await;
    }

    #[tokio::test]
    async fn test_setup_rejects_invalid_config() {
        let result =
            HubEntry::setup_with_transport(HubConfig::new(""), Arc::new(FakeHttp::ok()), None).await;
        assert!(matches!(result, Err(BridgeError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_mqtt_setup_requires_publisher() {
        let config = HubConfig {
            transport: TransportMode::Mqtt,
            ..HubConfig::new("10.0.0.50")
        };
        let result = HubEntry::setup_with_transport(config, Arc::new(FakeHttp::ok()), None).await;
        assert!(matches!(result, Err(BridgeError::SetupFailed(_))));
    }

    #[tokio::test]
    async fn test_services_reach_client() {
        let publisher = Arc::new(FakePublisher::default());
        let config = HubConfig {
            transport: TransportMode::Mqtt,
            ..HubConfig::new("10.0.0.50")
        };
        let entry =
            HubEntry::setup_with_transport(config, Arc::new(FakeHttp::ok()), Some(publisher.clone()))
                .await
                .unwrap();

        entry
            .call_service(ServiceCall::SendIr {
                raw: "0xABC".into(),
            })
            .await
            .unwrap();
        entry.call_service(ServiceCall::LearnIr).await.unwrap();

        assert_eq!(
            publisher.published(),
            vec![
                ("tele/tasmota_ir/command".to_string(), "0xABC".to_string()),
                ("tele/tasmota_ir/command".to_string(), "IRLearn".to_string()),
            ]
        );
        entry.unload().await;
    }

    #[tokio::test]
    async fn test_unload_closes_session() {
        let http = Arc::new(FakeHttp::ok());
        let entry = HubEntry::setup_with_transport(HubConfig::new("hub"), http.clone(), None)
            .await
            .unwrap();

        entry.unload().await;
        assert!(http.closed());
    }
}
