//! Async client for a Tasmota-based IR hub.
//!
//! Supports two transports:
//! - HTTP: commands go to the web console (`/cm?cmnd=...`)
//! - MQTT: commands are published to `<topic>/command`
//!
//! Error handling differs on purpose between the two. HTTP transport
//! failures are logged and returned to the caller; a response with any
//! status counts as delivered. MQTT publish failures are logged and
//! swallowed.

use super::command::{LEARN_CANDIDATES, MQTT_LEARN_PAYLOAD, TasmotaCommand};
use super::transport::{CommandPublisher, HttpTransport, ReqwestTransport};
use crate::config::HubConfig;
use crate::error::{BridgeError, Result};
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on any single HTTP call to the hub.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct IrHubClient {
    config: HubConfig,
    http: Arc<dyn HttpTransport>,
    publisher: Option<Arc<dyn CommandPublisher>>,
}

impl IrHubClient {
    /// Create a client using the default `reqwest` transport.
    pub fn new(config: HubConfig, publisher: Option<Arc<dyn CommandPublisher>>) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()), publisher)
    }

    pub fn with_transport(
        config: HubConfig,
        http: Arc<dyn HttpTransport>,
        publisher: Option<Arc<dyn CommandPublisher>>,
    ) -> Self {
        Self {
            config,
            http,
            publisher,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn use_mqtt(&self) -> bool {
        self.config.use_mqtt()
    }

    /// Send a raw IR code to the hub.
    pub async fn send_ir(&self, raw_code: &str) -> Result<()> {
        if self.use_mqtt() {
            let topic = self.config.command_topic();
            match self.publish(&topic, raw_code).await {
                Ok(()) => debug!("[MQTT] Published IR code to {}", topic),
                Err(e) => error!("[MQTT] Failed to publish IR code: {}", e),
            }
            return Ok(());
        }

        let url = TasmotaCommand::IrSend(raw_code.to_string())
            .url(&self.config.host, self.config.port);
        debug!("[HTTP] Sending IR request to {}", url);

        let response = self
            .http
            .get(&url, self.config.basic_auth(), HTTP_TIMEOUT)
            .await
            .inspect_err(|e| error!("[HTTP] Error sending IR code: {}", e))?;

        debug!("[HTTP] IR send response: {}", response.body);
        if !response.is_success() {
            warn!("[HTTP] IR send answered with status {}", response.status);
        }
        Ok(())
    }

    /// Put the hub into IR learning mode.
    ///
    /// The learn command name depends on the firmware build, so over HTTP
    /// each candidate is tried until one gets through. The response content
    /// is not checked.
    pub async fn start_learn_mode(&self) -> Result<()> {
        if self.use_mqtt() {
            let topic = self.config.command_topic();
            match self.publish(&topic, MQTT_LEARN_PAYLOAD).await {
                Ok(()) => debug!("[MQTT] Published learn request to {}", topic),
                Err(e) => error!("[MQTT] Failed to publish learn request: {}", e),
            }
            return Ok(());
        }

        for cmd in LEARN_CANDIDATES.iter() {
            let url = cmd.url(&self.config.host, self.config.port);
            match self
                .http
                .get(&url, self.config.basic_auth(), HTTP_TIMEOUT)
                .await
            {
                Ok(response) => {
                    debug!("[HTTP] Called {} -> {}", cmd, response.body);
                    return Ok(());
                }
                Err(e) => {
                    debug!("[HTTP] Learn command {} failed ({}), trying next", cmd, e);
                }
            }
        }

        error!("[HTTP] Failed to start IR learn mode");
        Ok(())
    }

    /// Close the pooled HTTP session.
    pub async fn close(&self) {
        self.http.close().await;
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let publisher = self.publisher.as_ref().ok_or_else(|| {
            BridgeError::InvalidConfig("mqtt transport selected without a broker connection".into())
        })?;
        publisher.publish(topic, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportMode;
    use crate::hub::testing::{FakeHttp, FakePublisher};

    fn http_config() -> HubConfig {
        HubConfig::new("10.0.0.50")
    }

    fn mqtt_config() -> HubConfig {
        HubConfig {
            transport: TransportMode::Mqtt,
            mqtt_topic: "tele/tasmota_ir".into(),
            ..HubConfig::new("10.0.0.50")
        }
    }

    #[tokio::test]
    async fn test_http_send_issues_single_get() {
        let http = Arc::new(FakeHttp::ok());
        let client = IrHubClient::with_transport(http_config(), http.clone(), None);

        client.send_ir("0xABC").await.unwrap();

        assert_eq!(
            http.calls(),
            vec!["http://10.0.0.50:80/cm?cmnd=IRSend%200xABC".to_string()]
        );
    }

    #[tokio::test]
    async fn test_http_send_attaches_auth_when_configured() {
        let http = Arc::new(FakeHttp::ok());
        let config = HubConfig {
            http_user: Some("admin".into()),
            http_pass: Some("secret".into()),
            ..http_config()
        };
        let client = IrHubClient::with_transport(config, http.clone(), None);

        client.send_ir("0x1").await.unwrap();

        assert_eq!(
            http.auths(),
            vec![Some(("admin".to_string(), "secret".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_http_send_propagates_network_error() {
        let http = Arc::new(FakeHttp::failing());
        let client = IrHubClient::with_transport(http_config(), http.clone(), None);

        let err = client.send_ir("0xABC").await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(_)));
        assert_eq!(http.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_http_send_error_status_is_not_an_error() {
        let http = Arc::new(FakeHttp::with_status(401));
        let client = IrHubClient::with_transport(http_config(), http.clone(), None);

        tokio_test::assert_ok!(client.send_ir("0xABC").await);
        assert_eq!(http.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mqtt_send_publishes_verbatim_code() {
        let http = Arc::new(FakeHttp::ok());
        let publisher = Arc::new(FakePublisher::default());
        let client =
            IrHubClient::with_transport(mqtt_config(), http.clone(), Some(publisher.clone()));

        client.send_ir("0x20DF 10EF").await.unwrap();

        assert_eq!(
            publisher.published(),
            vec![(
                "tele/tasmota_ir/command".to_string(),
                "0x20DF 10EF".to_string()
            )]
        );
        assert!(http.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mqtt_send_swallows_publish_error() {
        let publisher = Arc::new(FakePublisher::failing());
        let client = IrHubClient::with_transport(
            mqtt_config(),
            Arc::new(FakeHttp::ok()),
            Some(publisher.clone()),
        );

        tokio_test::assert_ok!(client.send_ir("0xABC").await);
        assert_eq!(publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn test_mqtt_send_without_publisher_is_swallowed() {
        let client = IrHubClient::with_transport(mqtt_config(), Arc::new(FakeHttp::ok()), None);
        tokio_test::assert_ok!(client.send_ir("0xABC").await);
    }

    #[tokio::test]
    async fn test_learn_falls_back_to_second_command() {
        let http = Arc::new(FakeHttp::failing_first(1));
        let client = IrHubClient::with_transport(http_config(), http.clone(), None);

        tokio_test::assert_ok!(client.start_learn_mode().await);

        assert_eq!(
            http.calls(),
            vec![
                "http://10.0.0.50:80/cm?cmnd=IRLearn%201".to_string(),
                "http://10.0.0.50:80/cm?cmnd=IRLearning%201".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_learn_stops_at_first_success() {
        let http = Arc::new(FakeHttp::with_status(500));
        let client = IrHubClient::with_transport(http_config(), http.clone(), None);

        client.start_learn_mode().await.unwrap();
        assert_eq!(http.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_learn_all_candidates_failing_is_not_an_error() {
        let http = Arc::new(FakeHttp::failing());
        let client = IrHubClient::with_transport(http_config(), http.clone(), None);

        tokio_test::assert_ok!(client.start_learn_mode().await);
        assert_eq!(http.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mqtt_learn_publishes_literal() {
        let publisher = Arc::new(FakePublisher::default());
        let client = IrHubClient::with_transport(
            mqtt_config(),
            Arc::new(FakeHttp::ok()),
            Some(publisher.clone()),
        );

        client.start_learn_mode().await.unwrap();

        assert_eq!(
            publisher.published(),
            vec![(
                "tele/tasmota_ir/command".to_string(),
                "IRLearn".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_close_releases_transport() {
        let http = Arc::new(FakeHttp::ok());
        let client = IrHubClient::with_transport(http_config(), http.clone(), None);

        client.close().await;
        assert!(http.closed());
    }
}
