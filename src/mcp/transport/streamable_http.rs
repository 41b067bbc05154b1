use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use rust_mcp_schema::schema_utils::{ClientMessage, ServerMessage};
use rust_mcp_schema::{RequestId, LATEST_PROTOCOL_VERSION};
use tracing::debug;

use super::McpSession;

const MCP_JSON_CONTENT_TYPE: &str = "application/json";
const MCP_JSON_AND_SSE_ACCEPT: &str = "application/json, text/event-stream";
const MCP_PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

#[derive(Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut search_index = 0;

        while let Some(relative_pos) = memchr::memchr(b'\n', &self.buffer[search_index..]) {
            let newline_index = search_index + relative_pos;
            let mut line_end = newline_index;
            if line_end > search_index && self.buffer[line_end - 1] == b'\r' {
                line_end -= 1;
            }

            if let Ok(text) = std::str::from_utf8(&self.buffer[search_index..line_end]) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }

            search_index = newline_index + 1;
        }

        if flush {
            if let Ok(text) = std::str::from_utf8(&self.buffer[search_index..]) {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
            self.buffer.clear();
        } else if search_index > 0 {
            self.buffer.drain(..search_index);
        }

        lines
    }
}

pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

pub fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

fn decode_sse_line(line: &str) -> Result<Option<ServerMessage>, String> {
    match sse_data_payload(line) {
        Some(payload) if !payload.is_empty() => serde_json::from_str::<ServerMessage>(payload)
            .map(Some)
            .map_err(|err| err.to_string()),
        _ => Ok(None),
    }
}

fn is_final_for(message: &ServerMessage, id: &RequestId) -> bool {
    match message {
        ServerMessage::Response(response) => &response.id == id,
        ServerMessage::Error(error) => error.id.as_ref().is_none_or(|error_id| error_id == id),
        _ => false,
    }
}

/// Reads an event-stream body until the response for `id` shows up.
pub async fn next_sse_server_message(
    response: reqwest::Response,
    id: &RequestId,
) -> Result<ServerMessage, String> {
    let mut stream = response.bytes_stream();
    let mut buffer = SseLineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| err.to_string())?;
        for line in buffer.push(&chunk) {
            if let Some(message) = decode_sse_line(&line)? {
                if is_final_for(&message, id) {
                    return Ok(message);
                }
            }
        }
    }

    for line in buffer.finish() {
        if let Some(message) = decode_sse_line(&line)? {
            if is_final_for(&message, id) {
                return Ok(message);
            }
        }
    }

    Err("Empty event-stream response.".to_string())
}

/// One streamable HTTP session; the server-assigned session id is replayed on
/// every later request and released with a DELETE on close.
pub struct HttpSession {
    client: reqwest::Client,
    url: String,
    headers: BTreeMap<String, String>,
    session_id: Option<String>,
}

impl HttpSession {
    pub fn new(client: reqwest::Client, url: String, headers: BTreeMap<String, String>) -> Self {
        Self {
            client,
            url,
            headers,
            session_id: None,
        }
    }

    fn with_session_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request = request.header(MCP_PROTOCOL_VERSION_HEADER, LATEST_PROTOCOL_VERSION);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(session_id) = &self.session_id {
            request = request.header(MCP_SESSION_ID_HEADER, session_id.as_str());
        }
        request
    }

    async fn post(&mut self, message: &ClientMessage) -> Result<reqwest::Response, String> {
        let payload = serde_json::to_string(message).map_err(|err| err.to_string())?;
        let request = self.with_session_headers(
            self.client
                .post(&self.url)
                .header("Content-Type", MCP_JSON_CONTENT_TYPE)
                .header("Accept", MCP_JSON_AND_SSE_ACCEPT),
        );

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP error: {}", response.status()));
        }

        if let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            self.session_id = Some(session_id.to_string());
        }
        Ok(response)
    }
}

#[async_trait]
impl McpSession for HttpSession {
    async fn request(
        &mut self,
        id: RequestId,
        message: ClientMessage,
    ) -> Result<ServerMessage, String> {
        debug!(url = %self.url, request_id = ?id, "Sending MCP HTTP request");
        let response = self.post(&message).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if is_event_stream_content_type(&content_type) {
            next_sse_server_message(response, &id).await
        } else {
            let body = response.bytes().await.map_err(|err| err.to_string())?;
            serde_json::from_slice::<ServerMessage>(&body).map_err(|err| err.to_string())
        }
    }

    async fn notify(&mut self, message: ClientMessage) -> Result<(), String> {
        self.post(&message).await.map(|_| ())
    }

    async fn close(self: Box<Self>) {
        if self.session_id.is_none() {
            return;
        }
        let request = self.with_session_headers(self.client.delete(&self.url));
        if let Err(err) = request.send().await {
            debug!(url = %self.url, error = %err, "MCP session DELETE failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_buffer_handles_partial_lines() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: one").is_empty());
        assert_eq!(buffer.push(b"\r\n\r\n"), vec!["data: one"]);
        assert_eq!(buffer.push(b"data: t"), Vec::<String>::new());
        assert_eq!(buffer.push(b"wo\n"), vec!["data: two"]);
        assert!(buffer.finish().is_empty());
    }

    #[test]
    fn detects_event_stream_content_type() {
        assert!(is_event_stream_content_type(
            "text/event-stream; charset=utf-8"
        ));
        assert!(!is_event_stream_content_type("application/json"));
    }

    #[test]
    fn extracts_sse_payload() {
        assert_eq!(sse_data_payload("data: {\"id\":1}"), Some("{\"id\":1}"));
        assert_eq!(sse_data_payload("event: ping"), None);
    }
}
