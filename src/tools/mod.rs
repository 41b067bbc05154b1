//! Tools the model may call: locally bundled handlers and remote providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::error::ToolExecutionError;

pub mod builtin;
pub mod registry;

pub use builtin::BuiltinTools;
pub use registry::{ToolRegistry, ToolSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_parameters")]
    pub parameters: Value,
}

/// Schema used when a tool declares no parameters.
pub fn empty_parameters() -> Value {
    json!({"type": "object", "properties": {}, "additionalProperties": false})
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A remote source of tools, reached once per discovery and once per call.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, String>;

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, ToolExecutionError>;
}
