//! Network seams used by the hub client.
//!
//! The client only talks to the hub through [`HttpTransport`] and
//! [`CommandPublisher`], so both directions can be swapped out in tests.

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, QoS};
use std::time::Duration;

/// Status and body of a hub HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET and return the response text.
    ///
    /// Only network level failures are errors; any status is returned as is.
    async fn get(
        &self,
        url: &str,
        auth: Option<(&str, &str)>,
        timeout: Duration,
    ) -> Result<HttpResponse>;

    /// Release pooled connections.
    async fn close(&self) {}
}

#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;
}

/// [`HttpTransport`] backed by a lazily created `reqwest::Client`.
#[derive(Default)]
pub struct ReqwestTransport {
    session: Mutex<Option<reqwest::Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pooled session, creating a new one after `close()`.
    fn session(&self) -> reqwest::Client {
        self.session
            .lock()
            .get_or_insert_with(|| {
                debug!("[HTTP] Creating new session");
                reqwest::Client::new()
            })
            .clone()
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        auth: Option<(&str, &str)>,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let mut request = self.session().get(url).timeout(timeout);
        if let Some((user, pass)) = auth {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(|e| map_reqwest(e, timeout))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| map_reqwest(e, timeout))?;

        Ok(HttpResponse { status, body })
    }

    async fn close(&self) {
        if self.session.lock().take().is_some() {
            debug!("[HTTP] Session closed");
        }
    }
}

fn map_reqwest(err: reqwest::Error, timeout: Duration) -> BridgeError {
    if err.is_timeout() {
        BridgeError::Timeout(timeout)
    } else {
        BridgeError::Http(err)
    }
}

#[async_trait]
impl CommandPublisher for AsyncClient {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        AsyncClient::publish(self, topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }
}
