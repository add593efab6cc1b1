#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_tools_list_parsing() {
        let args = CliArgs::try_parse_from(["ludus-mcp", "tools", "list"]).unwrap();
        match args.command {
            Commands::Tools {
                action: ToolsAction::List { server },
            } => {
                assert!(server.command.is_none());
                assert!(server.env.is_empty());
            }
            _ => panic!("Expected tools list command"),
        }
    }

    #[test]
    fn test_tools_call_parsing() {
        let args = CliArgs::try_parse_from([
            "ludus-mcp",
            "tools",
            "call",
            "deploy_range",
            "--args",
            r#"{"user": "analyst"}"#,
            "--timeout",
            "30",
            "--command",
            "ludus-fastmcp --debug",
            "--env",
            "LUDUS_VERBOSE=1",
        ])
        .unwrap();
        match args.command {
            Commands::Tools {
                action:
                    ToolsAction::Call {
                        name,
                        args,
                        timeout,
                        server,
                    },
            } => {
                assert_eq!(name, "deploy_range");
                assert_eq!(args, r#"{"user": "analyst"}"#);
                assert_eq!(timeout, 30);
                assert_eq!(server.command.as_deref(), Some("ludus-fastmcp --debug"));
                assert_eq!(server.env, vec!["LUDUS_VERBOSE=1".to_string()]);
            }
            _ => panic!("Expected tools call command"),
        }
    }

    #[test]
    fn test_tools_call_defaults() {
        let args = CliArgs::try_parse_from(["ludus-mcp", "tools", "call", "ping"]).unwrap();
        match args.command {
            Commands::Tools {
                action: ToolsAction::Call { args, timeout, .. },
            } => {
                assert_eq!(args, "{}");
                assert_eq!(timeout, 120);
            }
            _ => panic!("Expected tools call command"),
        }
    }

    #[test]
    fn test_health_parsing() {
        let args =
            CliArgs::try_parse_from(["ludus-mcp", "health", "--watch", "--interval", "5"]).unwrap();
        match args.command {
            Commands::Health {
                watch, interval, ..
            } => {
                assert!(watch);
                assert_eq!(interval, 5);
            }
            _ => panic!("Expected health command"),
        }
    }
}

use clap::{Args, Parser, Subcommand};

/// Ludus MCP - cyber-range lab tooling over a managed MCP tool server
#[derive(Parser, Debug)]
#[command(name = "ludus-mcp")]
#[command(about = "Build and manage Ludus cyber-range labs through an MCP tool server")]
#[command(version)]
pub struct CliArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interact with the MCP tool server
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
    /// Show connection and Ludus API health
    Health {
        #[command(flatten)]
        server: ServerOpts,

        /// Keep checking periodically and auto-recover on repeated failures
        #[arg(long)]
        watch: bool,

        /// Seconds between checks in watch mode
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum ToolsAction {
    /// List tools exposed by the MCP server
    List {
        #[command(flatten)]
        server: ServerOpts,
    },
    /// Call a tool by name
    Call {
        /// Tool name
        name: String,

        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// Timeout in seconds
        #[arg(long, default_value_t = 120)]
        timeout: u64,

        #[command(flatten)]
        server: ServerOpts,
    },
}

/// Options shared by every command that talks to the MCP server.
#[derive(Args, Debug)]
pub struct ServerOpts {
    /// Command used to launch the MCP server (default from config)
    #[arg(long)]
    pub command: Option<String>,

    /// Environment overrides for the server process
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}

/// Result of executing a CLI command
#[derive(Debug)]
pub enum CliResult {
    Success(String),
    Error(String),
}
