use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Hub entry setup failed: {0}")]
    SetupFailed(String),

    #[error("Coordinator update failed: {0}")]
    UpdateFailed(String),

    #[error("HTTP request to hub failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hub request timed out after {0:?}")]
    Timeout(Duration),

    #[error("MQTT publish failed: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Invalid IR payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid service call: {0}")]
    InvalidServiceCall(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
