use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::api::{into_tool_calls, ChatRequest, ChatResponse, ChatResponseMessage};
use crate::core::chat_stream::{extract_error_summary, format_api_error, ChatStream};
use crate::core::error::ChatError;
use crate::core::message::{Message, ToolCall};
use crate::core::normalize::strip_wrapping_quotes;
use crate::core::options::ModelOptions;
use crate::tools::ToolDefinition;

/// Full assistant message returned by a tool-aware request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Chat operations the orchestration layer needs from an inference server.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Blocking request for a complete reply.
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ModelOptions,
    ) -> Result<String, ChatError>;

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &ModelOptions,
    ) -> Result<ChatStream, ChatError>;

    async fn chat_with_tools(
        &self,
        model: &str,
        messages: &[Message],
        options: &ModelOptions,
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply, ChatError>;
}

fn http_client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
}

/// `/api/chat` under `api_base`. A base that already ends in `/api` is not
/// doubled.
fn chat_endpoint(api_base: &str) -> String {
    let base = api_base.trim().trim_end_matches('/');
    let base = base.strip_suffix("/api").unwrap_or(base);
    format!("{base}/api/chat")
}

/// HTTP client for an Ollama-compatible `/api/chat` endpoint.
#[derive(Clone)]
pub struct ModelClient {
    http: reqwest::Client,
    api_url: String,
    normalize_quotes: bool,
}

impl ModelClient {
    /// `timeout` bounds connecting and each read, so a reply that keeps
    /// streaming is never cut off.
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, ChatError> {
        let http = http_client_builder(timeout)
            .build()
            .map_err(ChatError::network)?;
        Ok(Self::with_http_client(api_base, http))
    }

    pub fn with_http_client(api_base: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            api_url: chat_endpoint(api_base),
            normalize_quotes: true,
        }
    }

    /// Controls whether `chat` strips one layer of wrapping quotes.
    pub fn with_quote_normalization(mut self, enabled: bool) -> Self {
        self.normalize_quotes = enabled;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response, ChatError> {
        debug!(
            model = request.model,
            messages = request.messages.len(),
            stream = request.stream,
            tools = request.tools.as_ref().map_or(0, Vec::len),
            "Sending chat request"
        );

        let response = self.http.post(&self.api_url).json(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        info!(%status, "Chat request rejected");
        Err(ChatError::Protocol(format!(
            "{} (HTTP {})",
            format_api_error(&body),
            status.as_u16()
        )))
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<ChatResponseMessage, ChatError> {
        let body = self.send(request).await?.text().await?;
        let response: ChatResponse = serde_json::from_str(&body)
            .map_err(|err| ChatError::protocol(format!("malformed chat response: {err}")))?;

        if let Some(error) = response.error {
            let summary = extract_error_summary(&serde_json::json!({ "error": error }))
                .unwrap_or_else(|| "unknown server error".to_string());
            return Err(ChatError::Protocol(summary));
        }

        response
            .message
            .ok_or_else(|| ChatError::protocol("chat response has no message"))
    }
}

#[async_trait]
impl ChatBackend for ModelClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ModelOptions,
    ) -> Result<String, ChatError> {
        let request = ChatRequest::new(model, messages, options, false);
        let content = self
            .complete(&request)
            .await?
            .content
            .ok_or_else(|| ChatError::protocol("chat response has no content"))?;

        if self.normalize_quotes {
            Ok(strip_wrapping_quotes(&content))
        } else {
            Ok(content)
        }
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &ModelOptions,
    ) -> Result<ChatStream, ChatError> {
        let request = ChatRequest::new(model, messages, options, true);
        let response = self.send(&request).await?;
        Ok(ChatStream::from_response(response))
    }

    async fn chat_with_tools(
        &self,
        model: &str,
        messages: &[Message],
        options: &ModelOptions,
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply, ChatError> {
        let request = ChatRequest::new(model, messages, options, false).with_tools(tools);
        let message = self.complete(&request).await?;
        let tool_calls = into_tool_calls(message.tool_calls.unwrap_or_default());
        debug!(tool_calls = tool_calls.len(), "Tool-aware reply received");

        Ok(AssistantReply {
            content: message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{
        direct_http_client, http_response, read_http_request, spawn_http_stub,
    };
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::io::AsyncWriteExt;

    fn client_for(addr: SocketAddr) -> ModelClient {
        ModelClient::with_http_client(&format!("http://{addr}/"), direct_http_client())
    }

    fn client_with_timeout(addr: SocketAddr, timeout: Duration) -> ModelClient {
        let http = http_client_builder(timeout)
            .no_proxy()
            .build()
            .expect("client should build");
        ModelClient::with_http_client(&format!("http://{addr}"), http)
    }

    /// Answers one request with an NDJSON body written record by record,
    /// sleeping `gap` before each record.
    async fn spawn_paced_stream(records: Vec<serde_json::Value>, gap: Duration) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            read_http_request(&mut stream).await.expect("request");
            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\nconnection: close\r\n\r\n";
            if stream.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for record in records {
                tokio::time::sleep(gap).await;
                if stream.write_all(format!("{record}\n").as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = stream.shutdown().await;
        });
        addr
    }

    #[test]
    fn chat_endpoint_joins_base_urls() {
        assert_eq!(chat_endpoint("http://localhost:11434"), "http://localhost:11434/api/chat");
        assert_eq!(chat_endpoint("http://localhost:11434///"), "http://localhost:11434/api/chat");
        assert_eq!(chat_endpoint(" http://gpu-box:11434/api/ "), "http://gpu-box:11434/api/chat");
        assert_eq!(
            chat_endpoint("https://proxy.lan/ollama"),
            "https://proxy.lan/ollama/api/chat"
        );
    }

    #[test]
    fn api_url_points_at_chat_endpoint() {
        let client = ModelClient::with_http_client("http://localhost:11434/", reqwest::Client::new());
        assert_eq!(client.api_url(), "http://localhost:11434/api/chat");
    }

    #[tokio::test]
    async fn steady_stream_outlives_the_timeout() {
        let records = (0..6)
            .map(|index| json!({"message": {"content": format!("{index}")}, "done": index == 5}))
            .collect();
        let addr = spawn_paced_stream(records, Duration::from_millis(400)).await;
        let client = client_with_timeout(addr, Duration::from_secs(1));

        let stream = client
            .chat_stream("m", &[Message::user("count")], &ModelOptions::default())
            .await
            .unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "012345");
    }

    #[tokio::test]
    async fn stalled_stream_times_out_as_network_error() {
        let records = vec![
            json!({"message": {"content": "never"}, "done": false}),
            json!({"message": {"content": ""}, "done": true}),
        ];
        let addr = spawn_paced_stream(records, Duration::from_secs(3)).await;
        let client = client_with_timeout(addr, Duration::from_millis(300));

        let stream = client
            .chat_stream("m", &[Message::user("hi")], &ModelOptions::default())
            .await
            .unwrap();
        let err = stream.collect_text().await.unwrap_err();
        assert!(matches!(err, ChatError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn chat_posts_options_and_normalizes_quotes() {
        let body = json!({"message": {"role": "assistant", "content": "\"Arr, matey!\" "}, "done": true});
        let (addr, server) =
            spawn_http_stub(vec![http_response("200 OK", "application/json", &body.to_string())])
                .await;
        let client = client_for(addr);
        let options = ModelOptions {
            temperature: 0.2,
            ..ModelOptions::default()
        };

        let reply = client
            .chat("llama3", &[Message::user("hello")], &options)
            .await
            .unwrap();
        assert_eq!(reply, "Arr, matey!");

        let requests = server.await.unwrap().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].request_line.starts_with("POST /api/chat "));
        let sent = requests[0].json();
        assert_eq!(sent["model"], "llama3");
        assert_eq!(sent["stream"], false);
        assert_eq!(sent["options"]["temperature"], 0.2);
        assert!(sent.get("tools").is_none());
    }

    #[tokio::test]
    async fn chat_keeps_quotes_when_normalization_is_off() {
        let body = json!({"message": {"content": "\"quoted\""}, "done": true});
        let (addr, _server) =
            spawn_http_stub(vec![http_response("200 OK", "application/json", &body.to_string())])
                .await;
        let client = client_for(addr).with_quote_normalization(false);
        let reply = client
            .chat("m", &[], &ModelOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, "\"quoted\"");
    }

    #[tokio::test]
    async fn missing_content_is_a_protocol_error() {
        let (addr, _server) =
            spawn_http_stub(vec![http_response("200 OK", "application/json", "{\"done\":true}")])
                .await;
        let err = client_for(addr)
            .chat("m", &[], &ModelOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Protocol(_)));
    }

    #[tokio::test]
    async fn http_error_status_surfaces_server_message() {
        let (addr, _server) = spawn_http_stub(vec![http_response(
            "404 Not Found",
            "application/json",
            "{\"error\":\"model \\\"ghost\\\" not found\"}",
        )])
        .await;
        let err = client_for(addr)
            .chat("ghost", &[], &ModelOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ChatError::Protocol("Server error: model \"ghost\" not found (HTTP 404)".to_string())
        );
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(addr)
            .chat("m", &[], &ModelOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));
    }

    #[tokio::test]
    async fn chat_stream_yields_ndjson_fragments() {
        let body = [
            json!({"message": {"content": "<think>hm</think>"}, "done": false}),
            json!({"message": {"content": "Ahoy"}, "done": false}),
            json!({"message": {"content": ""}, "done": true}),
        ]
        .iter()
        .map(|record| format!("{record}\n"))
        .collect::<String>();
        let (addr, server) =
            spawn_http_stub(vec![http_response("200 OK", "application/x-ndjson", &body)]).await;

        let stream = client_for(addr)
            .chat_stream("m", &[Message::user("hi")], &ModelOptions::default())
            .await
            .unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "<think>hm</think>Ahoy");

        let requests = server.await.unwrap().unwrap();
        assert_eq!(requests[0].json()["stream"], true);
    }

    #[tokio::test]
    async fn chat_with_tools_sends_schemas_and_parses_calls() {
        let body = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "word_count", "arguments": {"text": "a b c"}}}]
            },
            "done": true
        });
        let (addr, server) =
            spawn_http_stub(vec![http_response("200 OK", "application/json", &body.to_string())])
                .await;
        let tools = [ToolDefinition::new(
            "word_count",
            "Count words",
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]}),
        )];

        let reply = client_for(addr)
            .chat_with_tools("m", &[Message::user("count")], &ModelOptions::default(), &tools)
            .await
            .unwrap();
        assert!(reply.has_tool_calls());
        assert_eq!(reply.tool_calls[0].id, "call_0");
        assert_eq!(reply.tool_calls[0].name, "word_count");

        let sent = server.await.unwrap().unwrap()[0].json();
        assert_eq!(sent["tool_choice"], "auto");
        assert_eq!(sent["tools"][0]["function"]["name"], "word_count");
    }
}
