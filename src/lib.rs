//! Ollamarama is a terminal chatbot for local models served by Ollama.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation history, the model client, `<think>`
//!   filtering, persona handling, and the session controller that ties them
//!   together.
//! - [`tools`] holds the builtin tools and the registry that merges them with
//!   remote ones; [`mcp`] discovers and invokes tools on MCP servers.
//! - [`commands`] parses and executes slash commands.
//! - [`ui`] renders replies to the terminal and reads user input.
//! - [`api`] defines the Ollama wire payloads.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], which loads
//! configuration and runs the interactive loop.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod mcp;
pub mod tools;
pub mod ui;
pub mod utils;
