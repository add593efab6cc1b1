use crate::config::GlobalConfig;
use crate::error::LudusError;
use crate::ludus::LudusApiClient;
use crate::mcp::connection::ConnectionManager;
use crate::mcp::protocol::HEALTH_PROBE_TIMEOUT;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tracing::{info, warn};

/// Consecutive failed checks before auto-recovery is attempted.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Timeout for the informational Ludus API probe.
const LUDUS_API_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between periodic health checks.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Mutable health bookkeeping, one per connection manager. The state lives in
/// the manager and is shared by every monitor built on it, so the consecutive
/// failure count has a single source of truth.
#[derive(Debug)]
pub struct HealthState {
    pub last_check: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub monitoring_active: bool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            last_check: None,
            consecutive_failures: 0,
            failure_threshold: FAILURE_THRESHOLD,
            monitoring_active: false,
        }
    }
}

/// Point-in-time health snapshot. A pure read with no side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub mcp_server_alive: bool,
    pub last_check: Option<String>,
    pub consecutive_failures: u32,
    pub monitoring_active: bool,
    pub active_clients: usize,
}

/// Health checks and auto-recovery for the managed MCP subprocess, plus an
/// informational probe of the remote Ludus API.
pub struct HealthMonitor<'m> {
    manager: &'m ConnectionManager,
    state: Arc<StdMutex<HealthState>>,
    config: Option<GlobalConfig>,
}

impl<'m> HealthMonitor<'m> {
    pub fn new(manager: &'m ConnectionManager) -> Self {
        let state = manager.health_state();
        Self {
            manager,
            state,
            config: None,
        }
    }

    /// Attach settings used by the Ludus API probe. Without this the probe
    /// loads configuration on demand.
    pub fn with_config(mut self, config: GlobalConfig) -> Self {
        self.config = Some(config);
        self
    }

    fn record_failure(&self) {
        let mut state = self.state.lock().expect("health state lock poisoned");
        state.consecutive_failures += 1;
    }

    fn reset_failures(&self) {
        let mut state = self.state.lock().expect("health state lock poisoned");
        state.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state
            .lock()
            .expect("health state lock poisoned")
            .consecutive_failures
    }

    fn at_failure_threshold(&self) -> bool {
        let state = self.state.lock().expect("health state lock poisoned");
        state.consecutive_failures >= state.failure_threshold
    }

    /// Probe the subprocess: liveness first, then a `tools/list` round trip.
    /// Any failure path increments the consecutive failure counter; success
    /// resets it.
    pub async fn check_mcp_server(&self) -> bool {
        {
            let mut state = self.state.lock().expect("health state lock poisoned");
            state.last_check = Some(Utc::now());
        }

        if !self.manager.is_server_alive().await {
            warn!("health check failed: server process is not alive");
            self.record_failure();
            return false;
        }

        match self
            .manager
            .send_request("tools/list", None, HEALTH_PROBE_TIMEOUT)
            .await
        {
            Ok(result) => {
                if result.get("tools").is_some() {
                    self.reset_failures();
                    true
                } else {
                    warn!("health check failed: response missing tools field");
                    self.record_failure();
                    false
                }
            }
            Err(LudusError::TimeoutError(_)) => {
                warn!("health check failed: server response timeout");
                self.record_failure();
                false
            }
            Err(e) => {
                warn!("health check failed: {e}");
                self.record_failure();
                false
            }
        }
    }

    /// Best-effort probe of the remote Ludus API. Purely informational; never
    /// affects subprocess recovery decisions.
    pub async fn check_ludus_api(&self) -> (bool, Option<String>) {
        let config = match &self.config {
            Some(config) => config.clone(),
            None => match GlobalConfig::load().await {
                Ok(config) => config,
                Err(e) => return (false, Some(format!("failed to load configuration: {e}"))),
            },
        };

        if config.ludus.api_url.is_empty() || config.ludus.api_key.is_empty() {
            return (
                false,
                Some("Ludus API credentials not configured".to_string()),
            );
        }

        let client = match LudusApiClient::new(&config.ludus) {
            Ok(client) => client,
            Err(e) => return (false, Some(format!("Ludus API error: {e}"))),
        };

        match tokio::time::timeout(LUDUS_API_TIMEOUT, client.get_host_info()).await {
            Err(_) => (false, Some("Ludus API timeout".to_string())),
            Ok(Err(e)) => (false, Some(format!("Ludus API error: {e}"))),
            Ok(Ok(_)) => (true, None),
        }
    }

    /// Attempt recovery, but only once the failure threshold has been
    /// reached. Recovery errors are swallowed and reported as `false`.
    pub async fn auto_recover(&self) -> bool {
        if !self.at_failure_threshold() {
            return false;
        }

        warn!(
            "attempting auto-recovery after {} consecutive failures",
            self.consecutive_failures()
        );

        self.manager.kill_zombie_processes().await;
        if let Err(e) = self.manager.restart_server().await {
            warn!("auto-recovery failed: {e}");
            return false;
        }

        if self.check_mcp_server().await {
            info!("auto-recovery successful");
            self.reset_failures();
            true
        } else {
            warn!("auto-recovery failed: server still unhealthy");
            false
        }
    }

    /// Periodic monitoring loop. Single-flight: a no-op when already active.
    /// The stop flag is observed at each iteration boundary; failures inside
    /// an iteration are logged and the loop continues.
    pub async fn start_monitoring(&self, interval: Duration) {
        {
            let mut state = self.state.lock().expect("health state lock poisoned");
            if state.monitoring_active {
                return;
            }
            state.monitoring_active = true;
        }

        info!("starting health monitoring (interval: {:?})", interval);

        loop {
            {
                let state = self.state.lock().expect("health state lock poisoned");
                if !state.monitoring_active {
                    break;
                }
            }

            let healthy = self.check_mcp_server().await;
            if !healthy && self.at_failure_threshold() {
                self.auto_recover().await;
            }

            let (api_healthy, reason) = self.check_ludus_api().await;
            if !api_healthy {
                warn!(
                    "Ludus API health check failed: {}",
                    reason.unwrap_or_else(|| "unknown".to_string())
                );
            }

            tokio::time::sleep(interval).await;
        }

        info!("health monitoring stopped");
    }

    /// Flip the active flag; the loop exits at its next iteration boundary.
    pub fn stop_monitoring(&self) {
        let mut state = self.state.lock().expect("health state lock poisoned");
        state.monitoring_active = false;
    }

    pub async fn get_health_status(&self) -> HealthStatus {
        let (last_check, consecutive_failures, monitoring_active) = {
            let state = self.state.lock().expect("health state lock poisoned");
            (
                state.last_check,
                state.consecutive_failures,
                state.monitoring_active,
            )
        };

        HealthStatus {
            mcp_server_alive: self.manager.is_server_alive().await,
            last_check: last_check.map(|t| t.to_rfc3339()),
            consecutive_failures,
            monitoring_active,
            active_clients: self.manager.active_client_count(),
        }
    }
}
