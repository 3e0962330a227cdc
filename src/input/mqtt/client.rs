//! MQTT broker connection shared by command publishing and IR receiving.

use crate::config::MqttConfig;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Bound on flushing the disconnect packet at shutdown.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Message received from MQTT broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
}

/// Counters describing the broker link, published on every change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    /// Number of ConnAcks seen, reconnects included.
    pub connections: u32,
    /// Publish packets written to the broker.
    pub publishes_sent: u64,
}

/// What the event loop did with one polled event.
#[derive(Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// ConnAck received; subscriptions were queued again.
    Connected { resubscribed: usize },
    Message(MqttMessage),
    PublishSent,
    Ignored,
}

pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
    subscriptions: Vec<String>,
    status: watch::Sender<LinkStatus>,
}

impl MqttClient {
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, 100);
        let (status, _) = watch::channel(LinkStatus::default());

        Self {
            client,
            event_loop,
            subscriptions: Vec::new(),
            status,
        }
    }

    /// Subscribe to `topic` on every (re)connect.
    ///
    /// The broker drops subscriptions with a clean session, so they are
    /// renewed after each ConnAck rather than sent once.
    pub fn add_subscription(&mut self, topic: impl Into<String>) {
        let topic = topic.into();
        if !self.subscriptions.contains(&topic) {
            self.subscriptions.push(topic);
        }
    }

    /// Get a clone of the async client for publishing from other tasks.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    pub fn link_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// Drive the event loop and forward incoming publishes to `tx`.
    ///
    /// Runs until `cancel` fires or the receiving side of `tx` is dropped,
    /// then sends a disconnect if the broker link is up.
    pub async fn run(mut self, tx: mpsc::Sender<MqttMessage>, cancel: CancellationToken) {
        info!("[MQTT] Starting event loop");
        let mut connected = false;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.event_loop.poll() => event,
            };

            match event {
                Ok(event) => match self.handle_event(event) {
                    EventOutcome::Connected { .. } => connected = true,
                    EventOutcome::Message(msg) => {
                        if tx.send(msg).await.is_err() {
                            error!("[MQTT] Message channel closed");
                            break;
                        }
                    }
                    EventOutcome::PublishSent | EventOutcome::Ignored => {}
                },
                Err(e) => {
                    connected = false;
                    error!("[MQTT] Connection error: {:?}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }

        if connected {
            self.disconnect().await;
        }
        info!("[MQTT] Event loop stopped");
    }

    fn handle_event(&mut self, event: Event) -> EventOutcome {
        let outcome = match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                info!("[MQTT] Connected to broker");
                EventOutcome::Connected {
                    resubscribed: self.resubscribe(),
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                match String::from_utf8(publish.payload.to_vec()) {
                    Ok(payload) => {
                        debug!("[MQTT] Received on {}: {}", publish.topic, payload);
                        EventOutcome::Message(MqttMessage {
                            topic: publish.topic,
                            payload,
                        })
                    }
                    Err(e) => {
                        warn!("[MQTT] Invalid UTF-8 in payload on {}: {}", publish.topic, e);
                        EventOutcome::Ignored
                    }
                }
            }
            Event::Outgoing(Outgoing::Publish(_)) => EventOutcome::PublishSent,
            _ => EventOutcome::Ignored,
        };

        match outcome {
            EventOutcome::Connected { .. } => {
                self.status.send_modify(|s| s.connections += 1);
            }
            EventOutcome::PublishSent => {
                self.status.send_modify(|s| s.publishes_sent += 1);
            }
            _ => {}
        }
        outcome
    }

    /// Queue a subscribe for every registered topic. Returns how many were queued.
    fn resubscribe(&self) -> usize {
        let mut queued = 0;
        for topic in &self.subscriptions {
            info!("[MQTT] Subscribing to {}", topic);
            // Queued without waiting: this runs on the task that drains the queue
            match self.client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                Ok(()) => queued += 1,
                Err(e) => warn!("[MQTT] Failed to subscribe to {}: {:?}", topic, e),
            }
        }
        queued
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("[MQTT] Disconnect request not queued: {}", e);
            return;
        }

        let flush = async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
            debug!("[MQTT] Disconnect not flushed within {:?}", DISCONNECT_TIMEOUT);
        }
    }
}
