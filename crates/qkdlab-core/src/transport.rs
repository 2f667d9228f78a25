//! Boundary to the simulation engine.
//!
//! Every call has three outcomes: `Ok` on success,
//! `Err(CallError::Transport)` when the engine could not be reached or
//! answered with something unreadable, and `Err(CallError::Application)`
//! when it answered with a non-success status. The session controller
//! depends on that split.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{CallError, TransportError};
use crate::protocol::{
    Envelope, RunConfig, RunStatus, SimulationResult, SimulationSnapshot, StartAck,
};

pub const START_PATH: &str = "/api/start_continuous_simulation";
pub const STOP_PATH: &str = "/api/stop_continuous_simulation";
pub const POLL_PATH: &str = "/api/get_continuous_data";
pub const RUN_ONCE_PATH: &str = "/api/run_simulation";

#[async_trait]
pub trait SimulationTransport: Send + Sync {
    /// Start a continuous run. `Ok` only for a success acknowledgment.
    async fn start(&self, config: &RunConfig) -> Result<StartAck, CallError>;

    async fn stop(&self) -> Result<Envelope, CallError>;

    /// Fetch the current snapshot. A reachable engine answering with a
    /// non-success status is still `Ok`; the controller decides what that means.
    async fn poll(&self) -> Result<SimulationSnapshot, CallError>;

    async fn run_once(&self, config: &RunConfig) -> Result<SimulationResult, CallError>;
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// JSON-over-HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Network {
                endpoint: config.engine_url.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        endpoint: String,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CallError> {
        let response = request.send().await.map_err(|e| TransportError::Network {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| TransportError::Network {
            endpoint: endpoint.clone(),
            message: format!("response read failed: {e}"),
        })?;

        if !status.is_success() {
            // Engines report rejected input as an error envelope on a 4xx.
            if status.is_client_error() && status.as_u16() != 404 && status.as_u16() != 410 {
                if let Ok(envelope) = serde_json::from_str::<Envelope>(&body) {
                    return Err(CallError::application(
                        envelope.status,
                        envelope.message.unwrap_or_else(|| status.to_string()),
                    ));
                }
            }
            return Err(TransportError::Http {
                endpoint,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        serde_json::from_str(&body).map_err(|e| {
            TransportError::Decode {
                endpoint,
                message: e.to_string(),
            }
            .into()
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&RunConfig>,
    ) -> Result<T, CallError> {
        let endpoint = self.config.endpoint(path);
        let request = match body {
            Some(cfg) => self.client.post(&endpoint).json(cfg),
            None => self.client.post(&endpoint),
        };
        self.request_json(endpoint, request).await
    }
}

fn require_success(status: RunStatus, message: Option<&str>) -> Result<(), CallError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(CallError::application(
            status,
            message.unwrap_or("engine reported failure"),
        ))
    }
}

#[async_trait]
impl SimulationTransport for HttpTransport {
    async fn start(&self, config: &RunConfig) -> Result<StartAck, CallError> {
        let ack: StartAck = self.post(START_PATH, Some(config)).await?;
        require_success(ack.status, ack.message.as_deref())?;
        Ok(ack)
    }

    async fn stop(&self) -> Result<Envelope, CallError> {
        let envelope: Envelope = self.post(STOP_PATH, None).await?;
        // "info" means nothing was running, which is fine for a stop.
        match envelope.status {
            RunStatus::Success | RunStatus::Info | RunStatus::Stopped => Ok(envelope),
            RunStatus::Error => {
                require_success(envelope.status, envelope.message.as_deref())?;
                Ok(envelope)
            }
        }
    }

    async fn poll(&self) -> Result<SimulationSnapshot, CallError> {
        let endpoint = self.config.endpoint(POLL_PATH);
        let request = self.client.get(&endpoint);
        self.request_json(endpoint, request).await
    }

    async fn run_once(&self, config: &RunConfig) -> Result<SimulationResult, CallError> {
        let result: SimulationResult = self.post(RUN_ONCE_PATH, Some(config)).await?;
        require_success(result.status, result.message.as_deref())?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn unreachable_engine_is_a_transport_error() {
        let config = ClientConfig {
            request_timeout: Duration::from_millis(500),
            ..ClientConfig::default()
        }
        .with_engine_url("http://127.0.0.1:1")
        .unwrap();
        let transport = HttpTransport::new(config).unwrap();
        let err = transport.poll().await.unwrap_err();
        assert!(err.is_transport());
        match err {
            CallError::Transport(TransportError::Network { endpoint, .. }) => {
                assert_eq!(endpoint, "http://127.0.0.1:1/api/get_continuous_data");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn require_success_splits_status() {
        assert!(require_success(RunStatus::Success, None).is_ok());
        assert_eq!(
            require_success(RunStatus::Error, Some("bad input")),
            Err(CallError::application(RunStatus::Error, "bad input"))
        );
    }
}
