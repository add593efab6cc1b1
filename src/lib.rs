pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod ludus;
pub mod mcp;

pub use error::{LudusError, Result};
