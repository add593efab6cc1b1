//! Shared helpers for integration tests: small `sh` scripts that speak just
//! enough line-delimited JSON-RPC to stand in for a real MCP tool server.

#![allow(dead_code)]

use ludus_mcp::mcp::ConnectionManager;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stub that answers every request: `tools/call` yields two text content
/// items ("a", "b"), everything else yields a single-tool catalog.
pub const RESPONSIVE_SERVER: &str = r#"#!/bin/sh
while read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":[[:space:]]*\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *tools/call*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}],"isError":false}}\n' "$id"
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"ping"}]}}\n' "$id"
      ;;
  esac
done
"#;

/// Stub whose `tools/call` always reports a JSON-RPC error object.
pub const ERRORING_SERVER: &str = r#"#!/bin/sh
while read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":[[:space:]]*\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *tools/call*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32000,"message":"boom"}}\n' "$id"
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"ping"}]}}\n' "$id"
      ;;
  esac
done
"#;

/// Stub that never answers the `slow_probe` method and sleeps two seconds
/// before answering `tools/call`.
pub const SLOW_SERVER: &str = r#"#!/bin/sh
while read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":[[:space:]]*\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *slow_probe*)
      ;;
    *tools/call*)
      sleep 2
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"done"}]}}\n' "$id"
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"ping"}]}}\n' "$id"
      ;;
  esac
done
"#;

/// Stub that answers the initialize handshake correctly, then emits garbage.
pub const MALFORMED_SERVER: &str = r#"#!/bin/sh
first=1
while read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":[[:space:]]*\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  if [ "$first" = "1" ]; then
    first=0
    printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
  else
    echo 'this is not json'
  fi
done
"#;

/// Stub that closes its stdout after the initialize handshake while staying
/// alive, so later reads hit EOF on a live process.
pub const STDOUT_CLOSING_SERVER: &str = r#"#!/bin/sh
first=1
while read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":[[:space:]]*\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  if [ "$first" = "1" ]; then
    first=0
    printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
    exec 1>&-
  fi
done
"#;

/// Stub that dies right after the handshake, taking its pipes with it.
pub const DYING_SERVER: &str = r#"#!/bin/sh
read -r line
id=$(printf '%s' "$line" | sed -n 's/.*"id":[[:space:]]*\([0-9][0-9]*\).*/\1/p')
printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$id"
echo 'giving up' >&2
exit 5
"#;

/// Stub that prints a complaint to stderr and exits immediately.
pub const CRASHING_SERVER: &str = r#"#!/bin/sh
echo 'boot failure: missing range config' >&2
exit 7
"#;

/// Write a stub server script into `dir` and return its path.
pub fn write_stub_server(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).expect("failed to write stub server");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("failed to mark stub server executable");
    path
}

/// Build a manager (without the process-table capability, to keep tests
/// hermetic) configured to launch the given stub script.
pub async fn manager_for_stub(dir: &Path, name: &str, body: &str) -> Arc<ConnectionManager> {
    let script = write_stub_server(dir, name, body);
    let manager = Arc::new(ConnectionManager::with_enumerator(None));
    manager
        .configure(script.to_string_lossy().to_string(), HashMap::new())
        .await;
    manager
}
