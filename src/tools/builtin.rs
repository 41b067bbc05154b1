use std::collections::HashMap;

use chrono::{Local, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::ToolDefinition;
use crate::core::error::ToolExecutionError;

const MANIFEST: &str = include_str!("builtin_tools.json");

type Handler = fn(&Value) -> Result<Value, ToolExecutionError>;

struct BuiltinTool {
    definition: ToolDefinition,
    validator: jsonschema::Validator,
    handler: Handler,
}

/// Tools bundled with the binary, described by the embedded manifest.
pub struct BuiltinTools {
    tools: Vec<BuiltinTool>,
    index: HashMap<String, usize>,
}

fn handler_for(name: &str) -> Option<Handler> {
    let handler: Handler = match name {
        "add_numbers" => add_numbers,
        "multiply_numbers" => multiply_numbers,
        "word_count" => word_count,
        "get_time" => get_time,
        "sha256_hash" => sha256_hash,
        _ => return None,
    };
    Some(handler)
}

impl BuiltinTools {
    pub fn load() -> Result<Self, String> {
        let definitions: Vec<ToolDefinition> = serde_json::from_str(MANIFEST)
            .map_err(|err| format!("Invalid builtin tool manifest: {err}"))?;

        let mut tools = Vec::with_capacity(definitions.len());
        let mut index = HashMap::new();
        for definition in definitions {
            let handler = handler_for(&definition.name)
                .ok_or_else(|| format!("No handler for builtin tool {}", definition.name))?;
            let validator = jsonschema::validator_for(&definition.parameters)
                .map_err(|err| format!("Invalid schema for {}: {err}", definition.name))?;
            index.insert(definition.name.clone(), tools.len());
            tools.push(BuiltinTool {
                definition,
                validator,
                handler,
            });
        }

        debug!(count = tools.len(), "Loaded builtin tools");
        Ok(Self { tools, index })
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().map(|tool| &tool.definition)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Validates `arguments` against the tool's schema, then runs its handler.
    pub fn call(&self, name: &str, arguments: &Value) -> Result<Value, ToolExecutionError> {
        let tool = self
            .index
            .get(name)
            .map(|&position| &self.tools[position])
            .ok_or_else(|| ToolExecutionError::UnknownTool(name.to_string()))?;

        let problems: Vec<String> = tool
            .validator
            .iter_errors(arguments)
            .map(|err| err.to_string())
            .collect();
        if !problems.is_empty() {
            return Err(ToolExecutionError::InvalidArguments {
                tool: name.to_string(),
                reason: problems.join("; "),
            });
        }

        (tool.handler)(arguments)
    }
}

fn numbers(arguments: &Value) -> Vec<f64> {
    arguments
        .get("numbers")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default()
}

fn text(arguments: &Value) -> &str {
    arguments
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn add_numbers(arguments: &Value) -> Result<Value, ToolExecutionError> {
    Ok(json!({"result": numbers(arguments).iter().sum::<f64>()}))
}

fn multiply_numbers(arguments: &Value) -> Result<Value, ToolExecutionError> {
    Ok(json!({"result": numbers(arguments).iter().product::<f64>()}))
}

fn word_count(arguments: &Value) -> Result<Value, ToolExecutionError> {
    Ok(json!({"count": text(arguments).split_whitespace().count()}))
}

fn get_time(arguments: &Value) -> Result<Value, ToolExecutionError> {
    let requested = arguments
        .get("timezone")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|zone| !zone.is_empty())
        .unwrap_or("UTC");

    if requested.eq_ignore_ascii_case("utc") {
        return Ok(json!({"datetime": Utc::now().to_rfc3339(), "timezone": "UTC"}));
    }
    if requested.eq_ignore_ascii_case("local") {
        return Ok(json!({"datetime": Local::now().to_rfc3339(), "timezone": "local"}));
    }

    match requested.parse::<Tz>() {
        Ok(zone) => Ok(json!({
            "datetime": Utc::now().with_timezone(&zone).to_rfc3339(),
            "timezone": requested,
        })),
        Err(_) => Err(ToolExecutionError::Handler(format!(
            "Unsupported timezone '{requested}'. Use 'UTC', 'local', or an IANA name."
        ))),
    }
}

fn sha256_hash(arguments: &Value) -> Result<Value, ToolExecutionError> {
    let digest = Sha256::digest(text(arguments).as_bytes());
    Ok(json!({"sha256": format!("{digest:x}")}))
}
