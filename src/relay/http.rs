//! HTTP relay to the collaborator's result callback

use crate::config::{ConfigError, ServiceConfig};
use crate::protocol::messages::{DrugResult, OrderId, RelayPayload};
use crate::relay::{RelayError, ResultRelay};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// Callback path appended to the collaborator base URL
pub const UPDATE_RESULTS_PATH: &str = "/api/orders/async/update_results/";

/// Maximum number of response body bytes kept on a rejection
const MAX_REJECTION_BODY: usize = 512;

/// HTTP relay configuration
#[derive(Debug, Clone)]
pub struct HttpRelayConfig {
    pub base_url: String,
    pub secret_key: String,
    pub timeout: Duration,
}

impl Default for HttpRelayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            secret_key: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl HttpRelayConfig {
    /// Build relay settings from service config, resolving the secret from the environment
    pub fn from_service_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        config.collaborator_url()?;
        Ok(Self {
            base_url: config.collaborator.base_url.clone(),
            secret_key: config.get_secret_key()?,
            timeout: config.relay_timeout(),
        })
    }
}

/// Relay that POSTs results as JSON to the collaborator
pub struct HttpResultRelay {
    config: HttpRelayConfig,
    endpoint: String,
    client: Client,
}

impl HttpResultRelay {
    pub fn new(config: HttpRelayConfig) -> Result<Self, RelayError> {
        if config.secret_key.is_empty() {
            return Err(RelayError::NotConfigured(
                "Collaborator secret key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RelayError::NotConfigured(e.to_string()))?;

        let endpoint = Self::endpoint_url(&config.base_url);

        Ok(Self {
            config,
            endpoint,
            client,
        })
    }

    /// Full callback URL for a base URL, tolerating a trailing slash (pure function)
    fn endpoint_url(base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), UPDATE_RESULTS_PATH)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_payload(&self, order_id: OrderId, results: &[DrugResult]) -> RelayPayload {
        RelayPayload {
            secret_key: self.config.secret_key.clone(),
            order_id,
            results: results.to_vec(),
        }
    }
}

#[async_trait]
impl ResultRelay for HttpResultRelay {
    async fn relay(&self, order_id: OrderId, results: &[DrugResult]) -> Result<(), RelayError> {
        let payload = self.build_payload(order_id, results);
        let body = serde_json::to_vec(&payload)?;

        debug!(
            order_id = order_id,
            endpoint = %self.endpoint,
            bytes = body.len(),
            "Sending results to collaborator"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, MAX_REJECTION_BODY));
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            order_id = order_id,
            drugs_count = results.len(),
            "Results delivered to collaborator"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
