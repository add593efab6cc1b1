use clap::Parser;
use ludus_mcp::cli::{CliArgs, CliHandler, CliResult};
use ludus_mcp::config::GlobalConfig;
use ludus_mcp::logging;
use std::process;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // Load global configuration for logging and server defaults
    let global_config = match GlobalConfig::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Failed to load global configuration, using defaults: {e}");
            GlobalConfig::default()
        }
    };

    if let Err(e) = logging::init_cli_logging(&global_config) {
        eprintln!("Warning: Failed to initialize logging: {e}");
    }

    let handler = CliHandler::new(global_config).with_verbose(args.verbose);

    let result = match handler.handle_command(args).await {
        Ok(result) => result,
        Err(e) => CliResult::Error(format!("[{}] {e}", e.error_code())),
    };

    match result {
        CliResult::Success(msg) => {
            if !msg.is_empty() {
                println!("{msg}");
            }
            process::exit(0);
        }
        CliResult::Error(msg) => {
            eprintln!("{msg}");
            process::exit(1);
        }
    }
}
