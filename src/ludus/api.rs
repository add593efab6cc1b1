use crate::config::LudusConfig;
use crate::error::{LudusError, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Minimal client for the remote Ludus range-management API.
///
/// Only the lightweight host-info call is implemented; it serves purely as an
/// optional liveness probe for the health monitor and never influences
/// subprocess recovery.
pub struct LudusApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LudusApiClient {
    pub fn new(config: &LudusConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Fetch basic information about the Ludus host.
    pub async fn get_host_info(&self) -> Result<Value> {
        let url = format!("{}/host/info", self.base_url);
        debug!("probing Ludus API: {url}");

        let response = self
            .http
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LudusError::ApiError(format!(
                "[{}] {}",
                status.as_u16(),
                body.trim()
            )));
        }

        Ok(response.json().await?)
    }
}
