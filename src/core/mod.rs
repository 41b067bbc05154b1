pub mod chat_client;
pub mod chat_stream;
pub mod config;
pub mod error;
pub mod history;
pub mod message;
pub mod normalize;
pub mod options;
pub mod orchestrator;
pub mod persona;
pub mod reply;
pub mod session;
pub mod think_filter;
