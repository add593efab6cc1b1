use crate::cli::commands::{CliArgs, CliResult, Commands, ServerOpts, ToolsAction};
use crate::config::GlobalConfig;
use crate::error::{LudusError, Result};
use crate::mcp::connection::ConnectionManager;
use crate::mcp::health::HealthMonitor;
use crate::mcp::UnifiedClient;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Executes parsed CLI commands against the shared connection manager.
pub struct CliHandler {
    config: GlobalConfig,
    verbose: bool,
}

impl CliHandler {
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            config,
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub async fn handle_command(&self, args: CliArgs) -> Result<CliResult> {
        match args.command {
            Commands::Tools { action } => match action {
                ToolsAction::List { server } => self.handle_tools_list(&server).await,
                ToolsAction::Call {
                    name,
                    args,
                    timeout,
                    server,
                } => self.handle_tools_call(&name, &args, timeout, &server).await,
            },
            Commands::Health {
                server,
                watch,
                interval,
            } => self.handle_health(&server, watch, interval).await,
        }
    }

    async fn handle_tools_list(&self, server: &ServerOpts) -> Result<CliResult> {
        let (command, env) = self.resolve_server(server)?;
        let verbose = self.verbose;

        let tools = UnifiedClient::scoped(&command, env, |client| {
            Box::pin(async move { client.list_tools().await })
        })
        .await?;

        if tools.is_empty() {
            return Ok(CliResult::Success("No tools available".to_string()));
        }

        if verbose {
            return Ok(CliResult::Success(serde_json::to_string_pretty(&tools)?));
        }

        let mut lines = vec![format!("Available tools ({}):", tools.len())];
        for tool in &tools {
            match &tool.description {
                Some(description) => lines.push(format!("  {}: {}", tool.name, description)),
                None => lines.push(format!("  {}", tool.name)),
            }
        }
        Ok(CliResult::Success(lines.join("\n")))
    }

    async fn handle_tools_call(
        &self,
        name: &str,
        args: &str,
        timeout: u64,
        server: &ServerOpts,
    ) -> Result<CliResult> {
        let (command, env) = self.resolve_server(server)?;
        let arguments: Map<String, Value> = serde_json::from_str(args).map_err(|e| {
            LudusError::ConfigError(format!("tool arguments must be a JSON object: {e}"))
        })?;
        let timeout = Duration::from_secs(timeout);

        // Owned copies move into the future so it can outlive this stack frame.
        let name = name.to_string();
        let outcome = UnifiedClient::scoped(&command, env, move |client| {
            Box::pin(async move { client.call_tool(&name, Some(arguments), timeout).await })
        })
        .await?;

        if outcome.is_error {
            return Ok(CliResult::Error(format!(
                "Tool '{}' failed:\n{}",
                outcome.tool, outcome.result
            )));
        }

        if self.verbose {
            Ok(CliResult::Success(serde_json::to_string_pretty(&outcome)?))
        } else {
            Ok(CliResult::Success(outcome.result))
        }
    }

    async fn handle_health(
        &self,
        server: &ServerOpts,
        watch: bool,
        interval: u64,
    ) -> Result<CliResult> {
        let (command, env) = self.resolve_server(server)?;
        let manager = ConnectionManager::global();
        manager.configure(&command, env).await;
        let monitor = HealthMonitor::new(&manager).with_config(self.config.clone());

        if watch {
            // Runs until interrupted; stop_monitoring is only reachable from
            // another task, so ^C is the expected exit.
            monitor.start_monitoring(Duration::from_secs(interval)).await;
            return Ok(CliResult::Success(String::new()));
        }

        let client = UnifiedClient::with_manager(Arc::clone(&manager));
        client.connect().await;
        let status = monitor.get_health_status().await;
        let (api_healthy, api_reason) = monitor.check_ludus_api().await;
        client.disconnect().await;

        let report = json!({
            "mcp": status,
            "ludus_api": {
                "healthy": api_healthy,
                "reason": api_reason,
            },
        });
        Ok(CliResult::Success(serde_json::to_string_pretty(&report)?))
    }

    fn resolve_server(&self, opts: &ServerOpts) -> Result<(String, HashMap<String, String>)> {
        let command = opts
            .command
            .clone()
            .unwrap_or_else(|| self.config.mcp.command.clone());
        if command.trim().is_empty() {
            return Err(LudusError::ConfigError(
                "MCP server command must not be empty".to_string(),
            ));
        }
        let mut env = self.config.mcp.env.clone();
        env.extend(parse_env_pairs(&opts.env)?);
        Ok((command, env))
    }
}

/// Parse repeated `KEY=VALUE` flags into an environment map.
pub fn parse_env_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| {
                    LudusError::ConfigError(format!(
                        "invalid environment override '{pair}', expected KEY=VALUE"
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_pairs() {
        let env = parse_env_pairs(&[
            "LUDUS_API_URL=https://ludus.example:8080".to_string(),
            "LUDUS_VERBOSE=1".to_string(),
        ])
        .unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("LUDUS_VERBOSE").unwrap(), "1");
    }

    #[test]
    fn test_parse_env_pairs_value_may_contain_equals() {
        let env = parse_env_pairs(&["LUDUS_API_KEY=user.ab==".to_string()]).unwrap();
        assert_eq!(env.get("LUDUS_API_KEY").unwrap(), "user.ab==");
    }

    #[test]
    fn test_parse_env_pairs_rejects_missing_equals() {
        let err = parse_env_pairs(&["JUSTAKEY".to_string()]).unwrap_err();
        assert!(matches!(err, LudusError::ConfigError(_)));
    }

    #[test]
    fn test_resolve_server_falls_back_to_config() {
        let handler = CliHandler::new(GlobalConfig::default());
        let opts = ServerOpts {
            command: None,
            env: vec![],
        };
        let (command, env) = handler.resolve_server(&opts).unwrap();
        assert_eq!(command, "ludus-fastmcp");
        assert!(env.is_empty());
    }

    #[test]
    fn test_resolve_server_cli_overrides_config() {
        let mut config = GlobalConfig::default();
        config
            .mcp
            .env
            .insert("FROM_CONFIG".to_string(), "1".to_string());
        let handler = CliHandler::new(config);
        let opts = ServerOpts {
            command: Some("custom-server".to_string()),
            env: vec!["FROM_CONFIG=2".to_string()],
        };
        let (command, env) = handler.resolve_server(&opts).unwrap();
        assert_eq!(command, "custom-server");
        assert_eq!(env.get("FROM_CONFIG").unwrap(), "2");
    }
}
