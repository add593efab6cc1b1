use crate::error::{LudusError, Result};
use crate::mcp::enumerator::{ProcessEnumerator, SysinfoEnumerator};
use crate::mcp::health::{HealthMonitor, HealthState};
use crate::mcp::protocol::{
    CLIENT_NAME, CLIENT_VERSION, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVER_COMMAND,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION, ToolCallOutcome,
    ToolDescriptor, truncate_excerpt, widen_tool_timeout,
};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Settle delay after spawning before the liveness re-check.
const SPAWN_SETTLE_DELAY: Duration = Duration::from_millis(200);
/// How long a graceful shutdown waits before escalating to SIGKILL.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
/// Maximum number of characters of captured stderr surfaced in errors.
const STDERR_EXCERPT_LIMIT: usize = 500;
/// Maximum number of characters of an unparseable response line kept for
/// diagnosis.
const RAW_LINE_EXCERPT_LIMIT: usize = 200;

static GLOBAL_MANAGER: StdMutex<Option<Arc<ConnectionManager>>> = StdMutex::new(None);

/// Opaque handle identifying a registered client façade. Used purely for
/// shared-lifetime bookkeeping; no message is ever routed to a specific
/// client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

#[derive(Debug, Clone)]
struct ServerConfig {
    command: String,
    env: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_SERVER_COMMAND.to_string(),
            env: HashMap::new(),
        }
    }
}

/// The spawned tool-server subprocess with its stdio pipes.
struct ServerHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ServerHandle {
    fn is_alive(&mut self) -> bool {
        self.child.try_wait().map(|s| s.is_none()).unwrap_or(false)
    }

    fn exit_code(&mut self) -> Option<i32> {
        self.child.try_wait().ok().flatten().and_then(|s| s.code())
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let framed = format!("{line}\n");
        self.stdin
            .write_all(framed.as_bytes())
            .await
            .map_err(map_pipe_error)?;
        self.stdin.flush().await.map_err(map_pipe_error)?;
        Ok(())
    }

    /// Read exactly one newline-terminated line; `None` means EOF.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self.stdout.read_line(&mut line).await?;
        Ok(if n == 0 { None } else { Some(line) })
    }

    /// Drain up to the excerpt limit of stderr for diagnostics. Best effort:
    /// returns an empty string when nothing is readable quickly.
    async fn read_stderr_excerpt(&mut self) -> String {
        let Some(stderr) = self.stderr.as_mut() else {
            return String::new();
        };
        let mut buf = vec![0u8; STDERR_EXCERPT_LIMIT];
        match timeout(Duration::from_millis(250), stderr.read(&mut buf)).await {
            Ok(Ok(n)) => String::from_utf8_lossy(&buf[..n]).trim().to_string(),
            _ => String::new(),
        }
    }
}

fn map_pipe_error(error: std::io::Error) -> LudusError {
    if error.kind() == std::io::ErrorKind::BrokenPipe {
        LudusError::BrokenPipe("server closed connection (broken pipe)".to_string())
    } else {
        LudusError::IoError(error)
    }
}

/// One JSON-RPC round trip: write the request line, await exactly one
/// response line. Callers must hold the server lock, which serializes
/// concurrent exchanges so a response line is never attributed to the wrong
/// in-flight request. The server is assumed to reply in request order; there
/// is no id-based demultiplexing.
async fn exchange(
    handle: &mut ServerHandle,
    id: u64,
    method: &str,
    params: Option<Value>,
    wait: Duration,
) -> Result<Value> {
    let request = JsonRpcRequest::new(id, method, params);
    let line = serde_json::to_string(&request)?;
    handle.write_line(&line).await?;

    let response_line = match timeout(wait, handle.read_line()).await {
        Err(_) => {
            return Err(LudusError::TimeoutError(format!(
                "server did not respond to '{method}' within {}s",
                wait.as_secs_f64()
            )));
        }
        Ok(read) => read?,
    };

    let Some(response_line) = response_line else {
        // EOF: re-check liveness so the caller sees the exit code and stderr
        // rather than a generic "connection closed".
        if !handle.is_alive() {
            let code = handle.exit_code();
            let stderr_excerpt = handle.read_stderr_excerpt().await;
            return Err(LudusError::ConnectionClosed(format!(
                "server process exited with code {code:?}. Stderr: {stderr_excerpt}"
            )));
        }
        return Err(LudusError::ConnectionClosed(
            "server closed connection".to_string(),
        ));
    };

    let response: JsonRpcResponse = serde_json::from_str(response_line.trim()).map_err(|_| {
        LudusError::ProtocolError(format!(
            "invalid JSON response: {}",
            truncate_excerpt(&response_line, RAW_LINE_EXCERPT_LIMIT)
        ))
    })?;

    if let Some(error) = response.error {
        return Err(LudusError::RpcError(error.message));
    }

    Ok(response
        .result
        .unwrap_or_else(|| Value::Object(Map::new())))
}

/// Owns the single MCP tool-server subprocess and mediates all JSON-RPC
/// traffic with it.
///
/// Constructed once and shared by `Arc`; CLI call sites that need an ambient
/// instance go through [`ConnectionManager::global`]. All client façades
/// share this one subprocess and its sequential request stream.
pub struct ConnectionManager {
    config: StdMutex<ServerConfig>,
    /// Exchange lock: also guards the whole request/response round trip.
    server: Mutex<Option<ServerHandle>>,
    request_id: AtomicU64,
    next_client_id: AtomicU64,
    clients: StdMutex<HashSet<ClientId>>,
    shutting_down: AtomicBool,
    health: Arc<StdMutex<HealthState>>,
    enumerator: Option<Box<dyn ProcessEnumerator>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_enumerator(Some(Box::new(SysinfoEnumerator)))
    }

    /// Build a manager with an explicit (or absent) process-table capability.
    /// With `None` the orphan scan during recovery is skipped entirely.
    pub fn with_enumerator(enumerator: Option<Box<dyn ProcessEnumerator>>) -> Self {
        Self {
            config: StdMutex::new(ServerConfig::default()),
            server: Mutex::new(None),
            request_id: AtomicU64::new(0),
            next_client_id: AtomicU64::new(0),
            clients: StdMutex::new(HashSet::new()),
            shutting_down: AtomicBool::new(false),
            health: Arc::new(StdMutex::new(HealthState::default())),
            enumerator,
        }
    }

    /// Lazily create or return the process-wide shared instance.
    pub fn global() -> Arc<ConnectionManager> {
        let mut guard = GLOBAL_MANAGER
            .lock()
            .expect("global manager lock poisoned");
        guard
            .get_or_insert_with(|| Arc::new(ConnectionManager::new()))
            .clone()
    }

    /// Drop the shared instance, force-killing any owned subprocess first.
    /// Intended for test isolation only.
    pub async fn reset_global() {
        let existing = GLOBAL_MANAGER
            .lock()
            .expect("global manager lock poisoned")
            .take();
        if let Some(manager) = existing {
            manager.cleanup(false).await;
        }
    }

    pub(crate) fn health_state(&self) -> Arc<StdMutex<HealthState>> {
        Arc::clone(&self.health)
    }

    /// Set the command line and environment used by the next spawn. Has no
    /// effect on an already-running subprocess; last write wins.
    pub async fn configure(&self, command: impl Into<String>, env: HashMap<String, String>) {
        let command = command.into();
        let alive = self.is_server_alive().await;
        let mut config = self.config.lock().expect("config lock poisoned");
        if alive && (config.command != command || config.env != env) {
            warn!(
                "reconfiguring MCP server from '{}' to '{}' while a server is running; \
                 new settings apply on the next spawn",
                config.command, command
            );
        }
        config.command = command;
        config.env = env;
    }

    pub fn server_command(&self) -> String {
        self.config
            .lock()
            .expect("config lock poisoned")
            .command
            .clone()
    }

    /// Non-blocking poll of the subprocess exit status. No side effects.
    pub async fn is_server_alive(&self) -> bool {
        let mut guard = self.server.lock().await;
        guard.as_mut().map(|h| h.is_alive()).unwrap_or(false)
    }

    async fn server_pid(&self) -> Option<u32> {
        let guard = self.server.lock().await;
        guard.as_ref().and_then(|h| h.child.id())
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make sure the subprocess is up and responsive. Start failures are
    /// logged and reported as `false`, never raised; one recovery cycle is
    /// attempted when the health probe fails.
    pub async fn ensure_connected(&self) -> bool {
        if !self.is_server_alive().await {
            if let Err(e) = self.start_server().await {
                warn!("failed to start MCP server: {e}");
                return false;
            }
        }

        let monitor = HealthMonitor::new(self);
        let mut healthy = monitor.check_mcp_server().await;
        if !healthy {
            warn!("MCP server unhealthy, attempting recovery");
            self.recover_connection().await;
            healthy = monitor.check_mcp_server().await;
        }

        healthy
    }

    /// Spawn the configured command and perform the initialize handshake.
    /// No-op when a live subprocess already exists.
    pub async fn start_server(&self) -> Result<()> {
        let mut guard = self.server.lock().await;
        if let Some(handle) = guard.as_mut()
            && handle.is_alive()
        {
            return Ok(());
        }
        // Reap any stale handle before spawning a replacement.
        if let Some(mut stale) = guard.take() {
            let _ = stale.child.try_wait();
        }

        let (command, env) = {
            let config = self.config.lock().expect("config lock poisoned");
            (config.command.clone(), config.env.clone())
        };

        let parts = shlex::split(&command).ok_or_else(|| {
            LudusError::SpawnError(format!("failed to parse server command: {command}"))
        })?;
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| LudusError::SpawnError("empty server command".to_string()))?;

        info!("starting MCP server: {command}");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Custom env keys win over the ambient process environment.
        for (key, value) in &env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LudusError::SpawnError(format!(
                    "MCP server command not found: {command}. \
                     Make sure it is installed and on your PATH"
                ))
            } else {
                LudusError::SpawnError(format!("failed to spawn MCP server '{command}': {e}"))
            }
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LudusError::SpawnError("failed to capture server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LudusError::SpawnError("failed to capture server stdout".to_string()))?;
        let stderr = child.stderr.take();

        let mut handle = ServerHandle {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr,
        };

        // Give the server a moment to come up, then confirm it survived.
        tokio::time::sleep(SPAWN_SETTLE_DELAY).await;
        if !handle.is_alive() {
            let code = handle.exit_code();
            let stderr_excerpt = handle.read_stderr_excerpt().await;
            return Err(LudusError::SpawnError(format!(
                "MCP server exited immediately with code {code:?}. Stderr: {stderr_excerpt}"
            )));
        }

        self.initialize_server(&mut handle).await?;
        *guard = Some(handle);

        info!("MCP server started successfully");
        Ok(())
    }

    /// The MCP initialize handshake: an `initialize` request that must
    /// succeed, followed by the fire-and-forget `notifications/initialized`.
    async fn initialize_server(&self, handle: &mut ServerHandle) -> Result<()> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": CLIENT_VERSION,
            },
        });

        let id = self.next_request_id();
        if let Err(e) = exchange(handle, id, "initialize", Some(params), DEFAULT_REQUEST_TIMEOUT)
            .await
        {
            let stderr_excerpt = handle.read_stderr_excerpt().await;
            return Err(LudusError::SpawnError(format!(
                "server initialization failed: {e}. Stderr: {stderr_excerpt}"
            )));
        }

        let notification = JsonRpcNotification::new("notifications/initialized", json!({}));
        handle
            .write_line(&serde_json::to_string(&notification)?)
            .await
            .map_err(|_| {
                LudusError::BrokenPipe(
                    "server closed connection during initialization".to_string(),
                )
            })?;

        Ok(())
    }

    /// Send one JSON-RPC request and await its response. Fails immediately
    /// when no live subprocess exists; the round trip runs under the exchange
    /// lock.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        wait: Duration,
    ) -> Result<Value> {
        let mut guard = self.server.lock().await;
        match guard.as_mut() {
            Some(handle) => {
                if handle.is_alive() {
                    let id = self.next_request_id();
                    debug!("sending request {id}: {method}");
                    exchange(handle, id, method, params, wait).await
                } else {
                    Err(LudusError::ConnectionError(
                        "MCP server is not running".to_string(),
                    ))
                }
            }
            None => Err(LudusError::ConnectionError(
                "MCP server is not running".to_string(),
            )),
        }
    }

    /// Invoke a tool and flatten its content into a single result string.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
        wait: Duration,
    ) -> Result<ToolCallOutcome> {
        if !self.ensure_connected().await {
            return Err(LudusError::ConnectionError(
                "failed to connect to MCP server".to_string(),
            ));
        }

        let arguments = arguments.unwrap_or_default();
        let wait = widen_tool_timeout(name, wait);

        let result = self
            .send_request(
                "tools/call",
                Some(json!({"name": name, "arguments": arguments})),
                wait,
            )
            .await?;

        Ok(ToolCallOutcome::from_result(name, arguments, &result))
    }

    /// Fetch the server's tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        if !self.ensure_connected().await {
            return Err(LudusError::ConnectionError(
                "failed to connect to MCP server".to_string(),
            ));
        }

        let result = self
            .send_request("tools/list", None, DEFAULT_REQUEST_TIMEOUT)
            .await?;
        match result.get("tools") {
            Some(tools) => Ok(serde_json::from_value(tools.clone())?),
            None => Ok(Vec::new()),
        }
    }

    /// Kill-zombies-then-restart. Errors are logged, never propagated; the
    /// caller re-probes health to learn the outcome.
    pub(crate) async fn recover_connection(&self) {
        warn!("attempting connection recovery");
        self.kill_zombie_processes().await;
        if let Err(e) = self.restart_server().await {
            warn!("server restart failed during recovery: {e}");
        }
    }

    /// Reap a dead tracked handle, then best-effort kill any other process
    /// whose command line contains the configured server command. The scan is
    /// skipped when no process enumerator is available and never raises.
    pub async fn kill_zombie_processes(&self) {
        {
            let mut guard = self.server.lock().await;
            if let Some(handle) = guard.as_mut()
                && !handle.is_alive()
            {
                debug!("reaping dead MCP server handle");
                guard.take();
            }
        }

        let Some(enumerator) = self.enumerator.as_ref() else {
            return;
        };
        let command = self.server_command();
        let tracked_pid = self.server_pid().await;
        for pid in enumerator.find_by_command(&command) {
            if Some(pid) != tracked_pid && pid != std::process::id() {
                warn!("killing orphaned MCP server process {pid}");
                enumerator.kill(pid);
            }
        }
    }

    /// Force-cleanup then start a fresh subprocess.
    pub async fn restart_server(&self) -> Result<()> {
        self.cleanup(false).await;
        self.start_server().await
    }

    /// Tear down the subprocess and clear the façade registry. Idempotent and
    /// re-entrant safe; never raises — teardown errors are logged because
    /// cleanup runs on shutdown paths where raising would mask the original
    /// failure.
    pub async fn cleanup(&self, graceful: bool) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("cleaning up MCP connection");
        self.clients.lock().expect("client lock poisoned").clear();

        let handle = self.server.lock().await.take();
        if let Some(handle) = handle {
            let ServerHandle {
                mut child, stdin, ..
            } = handle;
            let result: std::io::Result<()> = async {
                if graceful {
                    drop(stdin);
                    if let (Some(pid), Some(enumerator)) = (child.id(), self.enumerator.as_ref()) {
                        enumerator.terminate(pid);
                    }
                    match timeout(GRACEFUL_SHUTDOWN_TIMEOUT, child.wait()).await {
                        Ok(status) => {
                            status?;
                        }
                        Err(_) => {
                            warn!("MCP server did not terminate in time, force killing");
                            child.kill().await?;
                        }
                    }
                } else {
                    child.kill().await?;
                }
                Ok(())
            }
            .await;
            if let Err(e) = result {
                warn!("error during MCP server teardown: {e}");
            }
        }

        self.shutting_down.store(false, Ordering::SeqCst);
        info!("cleanup complete");
    }

    pub fn allocate_client_id(&self) -> ClientId {
        ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn register_client(&self, id: ClientId) {
        self.clients.lock().expect("client lock poisoned").insert(id);
    }

    pub fn unregister_client(&self, id: ClientId) {
        self.clients
            .lock()
            .expect("client lock poisoned")
            .remove(&id);
    }

    pub fn active_client_count(&self) -> usize {
        self.clients.lock().expect("client lock poisoned").len()
    }
}
