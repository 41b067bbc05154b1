//! Scoped MCP sessions.
//!
//! A session is opened (and initialized) for a single piece of work, used for
//! one or a few requests, then closed. Nothing is kept alive between tool
//! invocations.

use async_trait::async_trait;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::RequestId;
use tracing::debug;

use crate::mcp::protocol::{client_details, parse_initialize_result};
use crate::mcp::server::{McpServerSpec, McpTransportSpec};

pub mod stdio;
pub mod streamable_http;

use stdio::StdioSession;
use streamable_http::HttpSession;

#[async_trait]
pub trait McpSession: Send {
    /// Sends a request and waits for the response carrying `id`.
    async fn request(
        &mut self,
        id: RequestId,
        message: ClientMessage,
    ) -> Result<ServerMessage, String>;

    async fn notify(&mut self, message: ClientMessage) -> Result<(), String>;

    /// Ends the session, terminating the server process or dropping the
    /// HTTP session. Failures are ignored.
    async fn close(self: Box<Self>);
}

/// Wraps a request with a fresh id and sends it.
pub async fn send_request(
    session: &mut dyn McpSession,
    request_id: i64,
    request: RequestFromClient,
) -> Result<ServerMessage, String> {
    let request_id = RequestId::Integer(request_id);
    let message = ClientMessage::from_message(
        MessageFromClient::RequestFromClient(request),
        Some(request_id.clone()),
    )
    .map_err(|err| err.to_string())?;
    session.request(request_id, message).await
}

pub async fn send_notification(
    session: &mut dyn McpSession,
    notification: NotificationFromClient,
) -> Result<(), String> {
    let message = ClientMessage::from_message(
        MessageFromClient::NotificationFromClient(notification),
        None,
    )
    .map_err(|err| err.to_string())?;
    session.notify(message).await
}

/// Connects to `spec` and completes the initialize handshake.
pub async fn open_session(
    spec: &McpServerSpec,
    http: &reqwest::Client,
) -> Result<Box<dyn McpSession>, String> {
    let mut session: Box<dyn McpSession> = match &spec.transport {
        McpTransportSpec::Stdio { command, args, env } => {
            Box::new(StdioSession::spawn(command, args, env)?)
        }
        McpTransportSpec::StreamableHttp { url, headers } => {
            Box::new(HttpSession::new(http.clone(), url.clone(), headers.clone()))
        }
    };

    match initialize(session.as_mut()).await {
        Ok(()) => {
            debug!(server = %spec.name, "MCP session initialized");
            Ok(session)
        }
        Err(err) => {
            session.close().await;
            Err(err)
        }
    }
}

async fn initialize(session: &mut dyn McpSession) -> Result<(), String> {
    let response = send_request(
        session,
        0,
        RequestFromClient::InitializeRequest(client_details()),
    )
    .await?;
    parse_initialize_result(response)?;
    send_notification(
        session,
        NotificationFromClient::InitializedNotification(None),
    )
    .await
}
