use crate::config::GlobalConfig;
use crate::error::{LudusError, Result};
use std::sync::Once;
use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*, registry::Registry};

static LOGGER_INIT: Once = Once::new();

/// Initialize the logging system for a specific component
fn init_component_logging(
    config: &GlobalConfig,
    component: &str,
    log_to_stderr: bool,
) -> Result<()> {
    let mut init_result = Ok(());

    LOGGER_INIT.call_once(|| {
        init_result = init_component_logging_internal(config, component, log_to_stderr);
    });

    init_result
}

/// Internal logging initialization (only called once)
fn init_component_logging_internal(
    config: &GlobalConfig,
    component: &str,
    log_to_stderr: bool,
) -> Result<()> {
    let log_level = config.logging.level.to_lowercase();

    let log_dir = if config.logging.file_enabled {
        let log_dir = config.get_log_dir();
        std::fs::create_dir_all(&log_dir).map_err(|e| {
            LudusError::ConfigError(format!("Failed to create log directory: {e}"))
        })?;
        Some(log_dir)
    } else {
        None
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log_level))
        .map_err(|e| LudusError::ConfigError(format!("Invalid log level '{log_level}': {e}")))?;

    let registry = Registry::default().with(filter);

    if let Some(ref log_dir) = log_dir {
        let file_appender = tracing_appender::rolling::never(log_dir, format!("{component}.log"));
        let file_layer = fmt::layer()
            .with_writer(file_appender)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        if log_to_stderr {
            // Diagnostics go to stderr; stdout is reserved for command output
            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(false);

            registry.with(file_layer).with(stderr_layer).init();
        } else {
            registry.with(file_layer).init();
        }
    } else if log_to_stderr {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);

        registry.with(stderr_layer).init();
    } else {
        return Err(LudusError::ConfigError(
            "File logging must be enabled for components that don't log to stderr".to_string(),
        ));
    }

    info!("{component} logging initialized with level: {log_level}");
    Ok(())
}

/// Initialize logging for CLI commands
pub fn init_cli_logging(config: &GlobalConfig) -> Result<()> {
    // Use info level for CLI unless explicitly set to debug/trace
    let mut cli_config = config.clone();
    if !matches!(
        cli_config.logging.level.to_lowercase().as_str(),
        "debug" | "trace"
    ) {
        cli_config.logging.level = "info".to_string();
    }

    init_component_logging(&cli_config, "cli", true)?;
    debug!("CLI logging initialized");
    Ok(())
}
