//! Remote tool providers reached over the Model Context Protocol.

pub mod client;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{providers_from_config, McpToolProvider};
pub use server::{McpServerSpec, McpTransportSpec};
