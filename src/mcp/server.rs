//! Connection specs for remote tool providers.

use std::collections::BTreeMap;

use crate::core::config::{McpServerEntry, McpServerTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpTransportSpec {
    /// Spawned child process speaking newline-delimited JSON-RPC.
    Stdio {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    },
    StreamableHttp {
        url: String,
        headers: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpServerSpec {
    pub name: String,
    pub transport: McpTransportSpec,
}

fn is_http_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl McpServerSpec {
    pub fn from_entry(name: &str, entry: &McpServerEntry) -> Result<Self, String> {
        let transport = match entry {
            McpServerEntry::Spec(spec) => Self::parse_spec_string(spec)?,
            McpServerEntry::Inline(table) => Self::from_table(table)?,
        };
        Ok(Self {
            name: name.to_string(),
            transport,
        })
    }

    /// A URL selects streamable HTTP; anything else is a command line.
    fn parse_spec_string(spec: &str) -> Result<McpTransportSpec, String> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err("MCP server spec is empty.".to_string());
        }
        if is_http_url(spec) {
            return Ok(McpTransportSpec::StreamableHttp {
                url: spec.to_string(),
                headers: BTreeMap::new(),
            });
        }

        let mut words = shell_words::split(spec)
            .map_err(|err| format!("Invalid MCP command line: {err}"))?
            .into_iter();
        let command = words
            .next()
            .ok_or_else(|| "MCP command is required for stdio transport.".to_string())?;
        Ok(McpTransportSpec::Stdio {
            command,
            args: words.collect(),
            env: BTreeMap::new(),
        })
    }

    fn from_table(table: &McpServerTable) -> Result<McpTransportSpec, String> {
        match (&table.url, &table.command) {
            (Some(url), _) if !url.trim().is_empty() => Ok(McpTransportSpec::StreamableHttp {
                url: url.trim().to_string(),
                headers: table.headers.clone(),
            }),
            (_, Some(command)) if !command.trim().is_empty() => Ok(McpTransportSpec::Stdio {
                command: command.trim().to_string(),
                args: table.args.clone(),
                env: table.env.clone(),
            }),
            _ => Err("MCP server table needs either `url` or `command`.".to_string()),
        }
    }

    pub fn describe(&self) -> String {
        match &self.transport {
            McpTransportSpec::Stdio { command, args, .. } if args.is_empty() => command.clone(),
            McpTransportSpec::Stdio { command, args, .. } => {
                format!("{command} {}", shell_words::join(args))
            }
            McpTransportSpec::StreamableHttp { url, .. } => url.clone(),
        }
    }
}
