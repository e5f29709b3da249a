pub mod discovery;
pub mod error;
pub mod job;
pub mod plugin;
pub mod pump;
pub mod registry;
pub mod rpc_server;
pub mod sink;
pub mod spawner;
pub mod transfer;

pub use error::{AgentError, Result};
pub use registry::JobRegistry;
pub use rpc_server::{serve_connection, AgentContext};
