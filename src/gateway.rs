//! Gateway client delivering alerts and metrics to a remote collector.
//!
//! Messages are posted as JSON to `<base>/v1/messages`, one request per
//! message. The blocking client wraps the async one with its own
//! current-thread runtime so the synchronous agent loop can use it as an
//! [`OutboundSink`].

use crate::outbound::{OutboundSink, OutgoingMessage, SinkError};
use serde::Deserialize;
use std::time::Duration;

/// Request timeout for every gateway call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL, e.g. `http://127.0.0.1:8080`
    pub base_url: String,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the message endpoint URL.
    pub fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

/// Gateway client error types.
#[derive(Debug)]
pub enum GatewayError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// JSON deserialization error
    Serialization(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Config(msg) => write!(f, "Gateway config error: {msg}"),
            GatewayError::Network(msg) => write!(f, "Gateway network error: {msg}"),
            GatewayError::Server { status, message } => {
                write!(f, "Gateway server error ({status}): {message}")
            }
            GatewayError::Serialization(msg) => write!(f, "Gateway serialization error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Acknowledgement returned by the collector.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayResponse {
    #[serde(default)]
    pub accepted: bool,
    /// Set when the collector rejected part of the message
    #[serde(default)]
    pub warning: Option<String>,
}

/// Async gateway client.
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Test connection to the gateway.
    pub async fn test_connection(&self) -> Result<bool, GatewayError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Post one message.
    pub async fn post(&self, message: &OutgoingMessage) -> Result<GatewayResponse, GatewayError> {
        let response = self
            .client
            .post(self.config.messages_url())
            .json(message)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }

        // An empty body is a plain acknowledgement.
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(GatewayResponse {
                accepted: true,
                warning: None,
            });
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Serialization(e.to_string()))
    }
}

/// Blocking gateway client for use in synchronous contexts.
pub struct BlockingGatewayClient {
    inner: GatewayClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingGatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: GatewayClient::new(config)?,
            runtime,
        })
    }

    pub fn test_connection(&self) -> Result<bool, GatewayError> {
        self.runtime.block_on(self.inner.test_connection())
    }

    pub fn post(&self, message: &OutgoingMessage) -> Result<GatewayResponse, GatewayError> {
        self.runtime.block_on(self.inner.post(message))
    }

    pub fn config(&self) -> &GatewayConfig {
        self.inner.config()
    }
}

impl OutboundSink for BlockingGatewayClient {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), SinkError> {
        let response = self
            .post(message)
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        if let Some(warning) = response.warning {
            tracing::warn!("Gateway warning: {warning}");
        }
        Ok(())
    }
}
