pub mod client;
pub mod connection;
pub mod enumerator;
pub mod health;
pub mod protocol;

pub use client::UnifiedClient;
pub use connection::{ClientId, ConnectionManager};
pub use enumerator::{ProcessEnumerator, SysinfoEnumerator};
pub use health::{HealthMonitor, HealthStatus};
pub use protocol::{ToolCallOutcome, ToolDescriptor};
