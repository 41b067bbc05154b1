use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::options::ModelOptions;
use crate::core::persona::{PersonaTemplate, DEFAULT_PERSONALITY};

pub const DEFAULT_API_BASE: &str = "http://localhost:11434";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    /// Short name -> fully-qualified model id.
    pub models: BTreeMap<String, String>,
    pub default_model: Option<String>,
    pub prompt: PersonaTemplate,
    pub personality: String,
    pub options: ModelOptions,
    pub mcp_servers: BTreeMap<String, McpServerEntry>,
    pub normalize_quotes: bool,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            models: BTreeMap::new(),
            default_model: None,
            prompt: PersonaTemplate::default(),
            personality: DEFAULT_PERSONALITY.to_string(),
            options: ModelOptions::default(),
            mcp_servers: BTreeMap::new(),
            normalize_quotes: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// How to reach one remote tool provider.
///
/// A bare string is either a URL or a command line; a table spells out the
/// command or URL explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerEntry {
    Spec(String),
    Inline(McpServerTable),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpServerTable {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, alias = "base_url")]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
