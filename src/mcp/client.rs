//! Remote tool provider backed by an MCP server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::RequestFromClient;
use rust_mcp_schema::CallToolRequestParams;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::error::ToolExecutionError;
use crate::mcp::protocol::{
    call_result_value, is_method_not_found, paginated_params, parse_response_value,
    parse_tool_page,
};
use crate::mcp::server::McpServerSpec;
use crate::mcp::transport::{open_session, send_request, McpSession};
use crate::tools::{ToolDefinition, ToolProvider};

const MCP_MAX_TOOL_PAGES: usize = 20;
const MCP_HTTP_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const MCP_HTTP_REQUEST_TIMEOUT_SECONDS: u64 = 60;

pub fn build_mcp_http_client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(MCP_HTTP_CONNECT_TIMEOUT_SECONDS))
        .timeout(Duration::from_secs(MCP_HTTP_REQUEST_TIMEOUT_SECONDS))
        .build()
        .map_err(|err| err.to_string())
}

/// Every call opens its own session and closes it before returning.
pub struct McpToolProvider {
    spec: McpServerSpec,
    http: reqwest::Client,
}

impl McpToolProvider {
    pub fn new(spec: McpServerSpec, http: reqwest::Client) -> Self {
        Self { spec, http }
    }

    pub fn spec(&self) -> &McpServerSpec {
        &self.spec
    }

    async fn list_in_session(session: &mut dyn McpSession) -> Result<Vec<ToolDefinition>, String> {
        let mut tools = Vec::new();
        let mut cursor = None;

        for page in 0..MCP_MAX_TOOL_PAGES {
            let request_id = page as i64 + 1;
            let response = send_request(
                session,
                request_id,
                RequestFromClient::ListToolsRequest(paginated_params(cursor.take())),
            )
            .await?;
            if is_method_not_found(&response) {
                break;
            }

            let page = parse_tool_page(&parse_response_value(response)?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tools)
    }

    async fn call_in_session(
        session: &mut dyn McpSession,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, String> {
        let mut params = CallToolRequestParams::new(tool);
        match arguments {
            Value::Object(map) => params = params.with_arguments(map),
            Value::Null => {}
            other => return Err(format!("arguments must be a JSON object, got {other}")),
        }

        let response = send_request(session, 1, RequestFromClient::CallToolRequest(params)).await?;
        call_result_value(&parse_response_value(response)?)
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, String> {
        let mut session = open_session(&self.spec, &self.http).await?;
        let result = Self::list_in_session(session.as_mut()).await;
        session.close().await;

        if let Ok(tools) = &result {
            debug!(server = %self.spec.name, count = tools.len(), "Discovered MCP tools");
        }
        result
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, ToolExecutionError> {
        let provider_error = |reason: String| ToolExecutionError::Provider {
            tool: tool.to_string(),
            reason,
        };

        let mut session = open_session(&self.spec, &self.http)
            .await
            .map_err(provider_error)?;
        let result = Self::call_in_session(session.as_mut(), tool, arguments).await;
        session.close().await;
        result.map_err(provider_error)
    }
}

/// Builds one provider per configured MCP server. Entries that cannot be
/// parsed are logged and skipped.
pub fn providers_from_config(config: &Config) -> Vec<Arc<dyn ToolProvider>> {
    if config.mcp_servers.is_empty() {
        return Vec::new();
    }

    let http = match build_mcp_http_client() {
        Ok(http) => http,
        Err(err) => {
            warn!(error = %err, "Unable to build MCP HTTP client; skipping MCP servers");
            return Vec::new();
        }
    };

    config
        .mcp_servers
        .iter()
        .filter_map(|(name, entry)| match McpServerSpec::from_entry(name, entry) {
            Ok(spec) => {
                debug!(server = %name, target = %spec.describe(), "Configured MCP server");
                Some(Arc::new(McpToolProvider::new(spec, http.clone())) as Arc<dyn ToolProvider>)
            }
            Err(err) => {
                warn!(server = %name, error = %err, "Skipping MCP server");
                None
            }
        })
        .collect()
}
