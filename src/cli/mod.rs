pub mod commands;
pub mod handler;

pub use commands::{CliArgs, CliResult, Commands, ServerOpts, ToolsAction};
pub use handler::CliHandler;
