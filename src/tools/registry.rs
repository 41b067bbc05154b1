use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{BuiltinTools, ToolDefinition, ToolProvider};
use crate::core::error::ToolExecutionError;
use crate::core::message::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSource {
    Builtin,
    /// Index into the registry's provider list.
    Remote(usize),
}

/// Merged tool set offered to the model, built once per session.
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
    sources: HashMap<String, ToolSource>,
    providers: Vec<Arc<dyn ToolProvider>>,
    builtins: BuiltinTools,
}

impl ToolRegistry {
    pub fn builtin_only(builtins: BuiltinTools) -> Self {
        Self::merge(builtins, Vec::new(), Vec::new())
    }

    /// Queries every provider for its tools and merges them with the
    /// builtins. A provider that fails discovery is skipped.
    pub async fn discover(builtins: BuiltinTools, providers: Vec<Arc<dyn ToolProvider>>) -> Self {
        let mut discovered = Vec::new();
        for (position, provider) in providers.iter().enumerate() {
            match provider.list_tools().await {
                Ok(tools) => {
                    info!(provider = provider.name(), tools = tools.len(), "Discovered remote tools");
                    discovered.extend(tools.into_iter().map(|tool| (position, tool)));
                }
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "Tool discovery failed");
                }
            }
        }
        Self::merge(builtins, providers, discovered)
    }

    fn merge(
        builtins: BuiltinTools,
        providers: Vec<Arc<dyn ToolProvider>>,
        remote: Vec<(usize, ToolDefinition)>,
    ) -> Self {
        let mut definitions = Vec::new();
        let mut sources = HashMap::new();

        for (position, tool) in remote {
            if sources.contains_key(&tool.name) {
                debug!(tool = %tool.name, "Duplicate remote tool ignored");
                continue;
            }
            sources.insert(tool.name.clone(), ToolSource::Remote(position));
            definitions.push(tool);
        }

        for tool in builtins.definitions() {
            if sources.contains_key(&tool.name) {
                debug!(tool = %tool.name, "Builtin tool shadowed by remote tool");
                continue;
            }
            sources.insert(tool.name.clone(), ToolSource::Builtin);
            definitions.push(tool.clone());
        }

        Self {
            definitions,
            sources,
            providers,
            builtins,
        }
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn source_of(&self, name: &str) -> Option<ToolSource> {
        self.sources.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Runs one tool call. Failures come back as an `{"error": ...}` payload
    /// so the model can react to them.
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        match self.execute(call).await {
            Ok(value) => {
                debug!(tool = %call.name, call_id = %call.id, "Tool call succeeded");
                render_result(value)
            }
            Err(err) => {
                warn!(tool = %call.name, call_id = %call.id, error = %err, "Tool call failed");
                err.to_payload()
            }
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolExecutionError> {
        let source = self
            .source_of(&call.name)
            .ok_or_else(|| ToolExecutionError::UnknownTool(call.name.clone()))?;
        let arguments = call.arguments_value()?;

        match source {
            ToolSource::Remote(position) => {
                let provider = self
                    .providers
                    .get(position)
                    .ok_or_else(|| ToolExecutionError::UnknownTool(call.name.clone()))?;
                provider.call_tool(&call.name, arguments).await
            }
            ToolSource::Builtin => self.builtins.call(&call.name, &arguments),
        }
    }
}

fn render_result(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
