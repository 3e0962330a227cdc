//! Routes IR messages from the broker into a hub coordinator.

use super::client::{MqttClient, MqttMessage};
use crate::coordinator::IrCoordinator;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct MqttIntegration {
    receive_topic: String,
    coordinator: Arc<IrCoordinator>,
}

impl MqttIntegration {
    pub fn new(coordinator: Arc<IrCoordinator>) -> Self {
        Self {
            receive_topic: coordinator.client().config().receive_topic(),
            coordinator,
        }
    }

    pub fn receive_topic(&self) -> &str {
        &self.receive_topic
    }

    /// Hand a message to the coordinator if it was published on the receive topic.
    ///
    /// Returns true if the message was routed.
    pub fn route(&self, msg: &MqttMessage) -> bool {
        if msg.topic != self.receive_topic {
            debug!("[MQTT] Ignoring message on {}", msg.topic);
            return false;
        }
        self.coordinator.handle_mqtt_message(&msg.topic, &msg.payload);
        true
    }

    /// Spawn the broker event loop and the routing task.
    pub fn start(self, mut mqtt_client: MqttClient, cancel: CancellationToken) -> JoinHandle<()> {
        mqtt_client.add_subscription(self.receive_topic.clone());
        tokio::spawn(async move {
            self.run(mqtt_client, cancel).await;
        })
    }

    async fn run(self, mqtt_client: MqttClient, cancel: CancellationToken) {
        let (msg_tx, mut msg_rx) = mpsc::channel::<MqttMessage>(64);
        let mqtt_loop = tokio::spawn(mqtt_client.run(msg_tx, cancel.child_token()));

        info!("[MQTT] Listening for IR readings on {}", self.receive_topic);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = msg_rx.recv() => match msg {
                    Some(msg) => {
                        self.route(&msg);
                    }
                    None => break,
                },
            }
        }

        if let Err(e) = mqtt_loop.await {
            warn!("[MQTT] Event loop task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HubConfig, TransportMode};
    use crate::hub::IrHubClient;
    use crate::hub::testing::FakeHttp;

    fn integration() -> MqttIntegration {
        let config = HubConfig {
            transport: TransportMode::Mqtt,
            mqtt_topic: "tele/ir_living".into(),
            ..HubConfig::new("10.0.0.50")
        };
        let client = IrHubClient::with_transport(config, Arc::new(FakeHttp::ok()), None);
        MqttIntegration::new(Arc::new(IrCoordinator::new(Arc::new(client))))
    }

    fn message(topic: &str, payload: &str) -> MqttMessage {
        MqttMessage {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    #[test]
    fn test_routes_receive_topic() {
        let integration = integration();
        assert_eq!(integration.receive_topic(), "tele/ir_living/RESULT");

        assert!(integration.route(&message("tele/ir_living/RESULT", r#"{"IR":"0x9"}"#)));
        let reading = integration.coordinator.data().unwrap();
        assert_eq!(reading.raw.as_deref(), Some("0x9"));
    }

    #[test]
    fn test_ignores_other_topics() {
        let integration = integration();

        assert!(!integration.route(&message("tele/ir_living/STATE", r#"{"IR":"0x9"}"#)));
        assert_eq!(integration.coordinator.data(), None);
    }
}
