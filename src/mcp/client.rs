use crate::error::Result;
use crate::mcp::connection::{ClientId, ConnectionManager};
use crate::mcp::health::{HealthMonitor, HealthStatus};
use crate::mcp::protocol::{ToolCallOutcome, ToolDescriptor};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

/// Lightweight per-call-site handle over the shared connection manager.
///
/// All real state lives in the manager; façades only add connect/disconnect
/// reference counting. The subprocess stays alive as long as at least one
/// façade remains registered.
pub struct UnifiedClient {
    manager: Arc<ConnectionManager>,
    id: ClientId,
    registered: AtomicBool,
}

impl UnifiedClient {
    /// Build a client against the process-wide shared manager, applying the
    /// given server command and environment (last writer wins across
    /// façades).
    pub async fn new(command: &str, env: HashMap<String, String>) -> Self {
        let manager = ConnectionManager::global();
        manager.configure(command, env).await;
        Self::with_manager(manager)
    }

    /// Build a client against an explicitly provided manager (dependency
    /// injection; preferred in tests and embedding code).
    pub fn with_manager(manager: Arc<ConnectionManager>) -> Self {
        let id = manager.allocate_client_id();
        Self {
            manager,
            id,
            registered: AtomicBool::new(false),
        }
    }

    /// Connect and register this façade. Registration is idempotent; the
    /// underlying subprocess is reused when already running.
    pub async fn connect(&self) {
        self.manager.ensure_connected().await;
        if !self.registered.swap(true, Ordering::SeqCst) {
            self.manager.register_client(self.id);
        }
    }

    /// Unregister this façade. The subprocess is torn down only when this was
    /// the last registered client.
    pub async fn disconnect(&self) {
        if self.registered.swap(false, Ordering::SeqCst) {
            self.manager.unregister_client(self.id);
        }
        if self.manager.active_client_count() == 0 {
            self.manager.cleanup(true).await;
        }
    }

    pub async fn ensure_connected(&self) -> bool {
        if !self.registered.load(Ordering::SeqCst) {
            self.connect().await;
        }
        self.manager.ensure_connected().await
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.ensure_connected().await;
        self.manager.list_tools().await
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
        timeout: Duration,
    ) -> Result<ToolCallOutcome> {
        self.ensure_connected().await;
        self.manager.call_tool(name, arguments, timeout).await
    }

    pub async fn get_health_status(&self) -> HealthStatus {
        HealthMonitor::new(&self.manager).get_health_status().await
    }

    /// Scoped acquisition: connect, run `f`, and disconnect on every exit
    /// path, so the registration is released even when `f` fails.
    pub async fn scoped<T, F>(command: &str, env: HashMap<String, String>, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(
            &'a UnifiedClient,
        ) -> Pin<Box<dyn Future<Output = Result<T>> + 'a>>,
    {
        let client = UnifiedClient::new(command, env).await;
        client.connect().await;
        let result = f(&client).await;
        client.disconnect().await;
        result
    }

    /// Scoped acquisition against an explicit manager.
    pub async fn scoped_with_manager<T, F>(manager: Arc<ConnectionManager>, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(
            &'a UnifiedClient,
        ) -> Pin<Box<dyn Future<Output = Result<T>> + 'a>>,
    {
        let client = UnifiedClient::with_manager(manager);
        client.connect().await;
        let result = f(&client).await;
        client.disconnect().await;
        result
    }
}

impl Drop for UnifiedClient {
    fn drop(&mut self) {
        if self.registered.load(Ordering::SeqCst) {
            // Best effort: release the registration, but the subprocess
            // cannot be torn down from a synchronous drop.
            self.manager.unregister_client(self.id);
            warn!("UnifiedClient dropped while connected; call disconnect() to release the server");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_two_clients_share_one_manager() {
        let manager = Arc::new(ConnectionManager::with_enumerator(None));
        let first = UnifiedClient::with_manager(Arc::clone(&manager));
        let second = UnifiedClient::with_manager(Arc::clone(&manager));
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_registration_is_idempotent() {
        let manager = Arc::new(ConnectionManager::with_enumerator(None));
        manager
            .configure("definitely-not-a-real-command-xyz", HashMap::new())
            .await;
        let client = UnifiedClient::with_manager(Arc::clone(&manager));

        client.connect().await;
        client.connect().await;
        assert_eq!(manager.active_client_count(), 1);

        client.disconnect().await;
        assert_eq!(manager.active_client_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_registration() {
        let manager = Arc::new(ConnectionManager::with_enumerator(None));
        manager
            .configure("definitely-not-a-real-command-xyz", HashMap::new())
            .await;
        {
            let client = UnifiedClient::with_manager(Arc::clone(&manager));
            client.connect().await;
            assert_eq!(manager.active_client_count(), 1);
        }
        assert_eq!(manager.active_client_count(), 0);
    }
}
