//! Error kinds surfaced by the conversation core.
//!
//! Each kind maps to a different reaction: [`ChatError`] fails the current
//! turn, [`ToolExecutionError`] is fed back to the model as a tool result, and
//! [`ValidationError`] rejects a settings change without touching state.

use serde_json::json;
use thiserror::Error;

/// Failure talking to the inference server. Turn-local; never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    /// Connection, DNS, or timeout failure before a usable response arrived.
    #[error("network error: {0}")]
    Network(String),
    /// The server answered, but not with something we can use.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ChatError {
    pub fn network(err: impl std::fmt::Display) -> Self {
        ChatError::Network(err.to_string())
    }

    pub fn protocol(err: impl std::fmt::Display) -> Self {
        ChatError::Protocol(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ChatError::Network(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ChatError::Protocol(err.to_string())
        } else {
            ChatError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolExecutionError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("Tool execution error for {tool}: {reason}")]
    Provider { tool: String, reason: String },
    #[error("{0}")]
    Handler(String),
}

impl ToolExecutionError {
    /// Structured payload handed back to the model in a `tool` message.
    pub fn to_payload(&self) -> String {
        json!({ "error": self.to_string() }).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("No value entered, nothing changed")]
    EmptyValue,
    #[error("Invalid input '{0}'. Please enter a numeric value.")]
    NotNumeric(String),
    #[error("Invalid value {value} for {option}. Must be between {min} and {max}")]
    OutOfRange {
        option: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("Unknown option: {0}")]
    UnknownOption(String),
    #[error("Unknown model: {name}. Available: {available}")]
    UnknownModel { name: String, available: String },
}
