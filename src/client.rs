//! HTTP client for the external KV cache simulator.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::trace::SimulationResult;

/// Default simulator endpoint.
pub const DEFAULT_SIMULATOR_URL: &str = "http://localhost:8000";

/// Tokens the simulator generates per request unless configured otherwise.
pub const DEFAULT_MAX_TOKENS: u32 = 5;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Error talking to the simulator
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Please enter a prompt")]
    EmptyPrompt,
    #[error("Cannot reach simulator: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Simulator returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to parse simulation result: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct SimulateRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct SimulatorClient {
    base_url: String,
    client: Client,
}

impl SimulatorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a simulation for `prompt` and return the full trace.
    pub async fn simulate(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<SimulationResult, ClientError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ClientError::EmptyPrompt);
        }

        let url = format!("{}/simulate", self.base_url);
        tracing::info!(url = %url, prompt = %prompt, "Requesting simulation");
        let response = self
            .client
            .post(&url)
            .json(&SimulateRequest { prompt, max_tokens })
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let result: SimulationResult = serde_json::from_str(&text)?;
        tracing::info!(
            events = result.events.len(),
            total_events = result.summary.total_events,
            "Simulation complete"
        );
        Ok(result)
    }

    /// Whether the simulator answers its health endpoint. Never errors.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Simulator health check failed");
                false
            }
        }
    }
}

impl Default for SimulatorClient {
    fn default() -> Self {
        Self::new(DEFAULT_SIMULATOR_URL)
    }
}
