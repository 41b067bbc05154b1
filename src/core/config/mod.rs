pub mod data;
pub mod defaults;
pub mod io;

pub use data::{Config, McpServerEntry, McpServerTable};
pub use io::{ConfigError, ConfigFormat};
