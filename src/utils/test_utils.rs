use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::core::chat_client::{AssistantReply, ChatBackend};
use crate::core::chat_stream::ChatStream;
use crate::core::error::ChatError;
use crate::core::message::{Message, ToolCall};
use crate::core::options::ModelOptions;
use crate::core::reply::{ResponseEnd, ResponseView};
use crate::tools::ToolDefinition;
use crate::ui::InputSource;

/// One request as seen by [`spawn_http_stub`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }
}

pub async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut header_end = None;
    while header_end.is_none() {
        let mut chunk = [0_u8; 1024];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        header_end = buffer
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|index| index + 4);
    }

    let header_end = header_end.expect("header end should exist");
    let header_text =
        std::str::from_utf8(&buffer[..header_end]).map_err(|err| err.to_string())?;
    let mut lines = header_text.split("\r\n").filter(|line| !line.is_empty());
    let request_line = lines
        .next()
        .ok_or_else(|| "Missing HTTP request line".to_string())?
        .to_string();

    let mut headers = Vec::new();
    let mut content_length = 0_usize;
    for line in lines {
        let mut parts = line.splitn(2, ':');
        let Some(name) = parts.next() else {
            continue;
        };
        let value = parts.next().unwrap_or_default().trim().to_string();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().map_err(|err| err.to_string())?;
        }
        headers.push((name.to_string(), value));
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = vec![0_u8; content_length.saturating_sub(body.len())];
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest {
        request_line,
        headers,
        body,
    })
}

pub fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serves the given raw responses in order, one per connection, and returns
/// the captured requests once all of them have been answered.
pub async fn spawn_http_stub(
    responses: Vec<String>,
) -> (SocketAddr, JoinHandle<Result<Vec<CapturedRequest>, String>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("local addr should resolve");

    let handle = tokio::spawn(async move {
        let mut captured = Vec::new();
        for response in responses {
            let (mut stream, _) = listener.accept().await.map_err(|err| err.to_string())?;
            captured.push(read_http_request(&mut stream).await?);
            stream
                .write_all(response.as_bytes())
                .await
                .map_err(|err| err.to_string())?;
            stream.shutdown().await.map_err(|err| err.to_string())?;
        }
        Ok(captured)
    });

    (addr, handle)
}

/// HTTP client that ignores proxy environment variables.
pub fn direct_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client should build")
}

/// View that records everything shown.
#[derive(Debug, Default)]
pub struct RecordingView {
    pub shown: String,
    pub thinking_updates: usize,
    pub finished: Vec<(String, ResponseEnd)>,
    pub notices: Vec<String>,
    pub errors: Vec<String>,
}

impl ResponseView for RecordingView {
    fn begin_response(&mut self) {}

    fn show_delta(&mut self, delta: &str, thinking: bool) {
        if thinking {
            self.thinking_updates += 1;
        }
        self.shown.push_str(delta);
    }

    fn end_response(&mut self, visible: &str, end: ResponseEnd) {
        self.finished.push((visible.to_string(), end));
    }

    fn notice(&mut self, text: &str) {
        self.notices.push(text.to_string());
    }

    fn error(&mut self, text: &str) {
        self.errors.push(text.to_string());
    }
}

/// Input source that answers prompts from a queue and records them.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    pub lines: VecDeque<String>,
    pub prompts: Vec<String>,
}

impl ScriptedInput {
    pub fn new<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }
}

#[async_trait]
impl InputSource for ScriptedInput {
    async fn read_line(&mut self, prompt: &str) -> std::io::Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Chat,
    Stream,
    Tools,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub kind: RequestKind,
    pub model: String,
    pub messages: Vec<Message>,
    pub options: ModelOptions,
    pub tool_names: Vec<String>,
}

/// Backend that replays queued replies and records every request.
///
/// Once the tool-reply queue is empty, `repeat_tool_call` (if set) is returned
/// forever; otherwise a plain empty reply is.
#[derive(Default)]
pub struct ScriptedBackend {
    pub chat_replies: Mutex<VecDeque<Result<String, ChatError>>>,
    pub streams: Mutex<VecDeque<Result<Vec<String>, ChatError>>>,
    pub tool_replies: Mutex<VecDeque<Result<AssistantReply, ChatError>>>,
    pub repeat_tool_call: Option<ToolCall>,
    pub requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stream<S: Into<String>>(&self, fragments: impl IntoIterator<Item = S>) -> &Self {
        self.streams
            .lock()
            .unwrap()
            .push_back(Ok(fragments.into_iter().map(Into::into).collect()));
        self
    }

    pub fn push_stream_error(&self, err: ChatError) -> &Self {
        self.streams.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn push_chat(&self, reply: Result<String, ChatError>) -> &Self {
        self.chat_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn push_tool_reply(&self, reply: Result<AssistantReply, ChatError>) -> &Self {
        self.tool_replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, kind: RequestKind) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.kind == kind)
            .count()
    }

    fn record(
        &self,
        kind: RequestKind,
        model: &str,
        messages: &[Message],
        options: &ModelOptions,
        tools: &[ToolDefinition],
    ) {
        self.requests.lock().unwrap().push(RecordedRequest {
            kind,
            model: model.to_string(),
            messages: messages.to_vec(),
            options: *options,
            tool_names: tools.iter().map(|tool| tool.name.clone()).collect(),
        });
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ModelOptions,
    ) -> Result<String, ChatError> {
        self.record(RequestKind::Chat, model, messages, options, &[]);
        self.chat_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ChatError::protocol("no scripted chat reply")))
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &ModelOptions,
    ) -> Result<ChatStream, ChatError> {
        self.record(RequestKind::Stream, model, messages, options, &[]);
        let next = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ChatError::protocol("no scripted stream")));
        next.map(ChatStream::from_fragments)
    }

    async fn chat_with_tools(
        &self,
        model: &str,
        messages: &[Message],
        options: &ModelOptions,
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply, ChatError> {
        self.record(RequestKind::Tools, model, messages, options, tools);
        let queued = self.tool_replies.lock().unwrap().pop_front();
        match (queued, &self.repeat_tool_call) {
            (Some(reply), _) => reply,
            (None, Some(call)) => Ok(AssistantReply {
                content: "still working".to_string(),
                tool_calls: vec![call.clone()],
            }),
            (None, None) => Ok(AssistantReply::default()),
        }
    }
}
