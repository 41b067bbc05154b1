use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use memchr::memchr;
use tracing::{debug, warn};

use crate::api::ChatResponse;
use crate::core::error::ChatError;

pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ChatError>>;

enum Record {
    Skip,
    Fragment(String),
    Done(Option<String>),
}

fn parse_record(line: &[u8]) -> Result<Record, ChatError> {
    let line = std::str::from_utf8(line)
        .map_err(|err| ChatError::protocol(format!("invalid UTF-8 in stream: {err}")))?
        .trim();
    if line.is_empty() {
        return Ok(Record::Skip);
    }

    let response: ChatResponse =
        serde_json::from_str(line).map_err(|_| ChatError::Protocol(format_api_error(line)))?;

    if let Some(error) = response.error {
        let summary = match &error {
            serde_json::Value::String(text) => text.clone(),
            other => extract_error_summary(&serde_json::json!({ "error": other }))
                .unwrap_or_else(|| other.to_string()),
        };
        return Err(ChatError::Protocol(summary));
    }

    let content = response
        .message
        .and_then(|message| message.content)
        .filter(|content| !content.is_empty());

    if response.done {
        return Ok(Record::Done(content));
    }
    Ok(content.map_or(Record::Skip, Record::Fragment))
}

/// Lazy sequence of content fragments decoded from an NDJSON response body.
///
/// Not restartable; a new request produces a new stream.
pub struct ChatStream {
    source: ByteStream,
    buffer: Vec<u8>,
    finished: bool,
    fragments_seen: usize,
}

impl ChatStream {
    pub fn new(source: ByteStream) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            finished: false,
            fragments_seen: 0,
        }
    }

    pub fn from_response(response: reqwest::Response) -> Self {
        let source = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ChatError::from))
            .boxed();
        Self::new(source)
    }

    /// Builds a stream that replays raw body chunks, split however the caller likes.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Result<Vec<u8>, ChatError>>,
        I::IntoIter: Send + 'static,
    {
        Self::new(futures_util::stream::iter(chunks).boxed())
    }

    /// Encodes each fragment as an NDJSON record followed by a `done` record.
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut body: Vec<Result<Vec<u8>, ChatError>> = fragments
            .into_iter()
            .map(|fragment| {
                let content: String = fragment.into();
                let record = serde_json::json!({
                    "message": {"role": "assistant", "content": content},
                    "done": false,
                });
                Ok(format!("{record}\n").into_bytes())
            })
            .collect();
        body.push(Ok(b"{\"done\":true}\n".to_vec()));
        Self::from_chunks(body)
    }

    /// Returns the next non-empty fragment, `None` once the `done` record has
    /// been seen, or the error that terminated the stream.
    pub async fn next_fragment(&mut self) -> Option<Result<String, ChatError>> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(newline) = memchr(b'\n', &self.buffer) {
                let line: Vec<u8> = self.buffer.drain(..=newline).collect();
                match self.handle_line(&line) {
                    Some(item) => return Some(item),
                    None => continue,
                }
            }

            match self.source.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    self.finished = true;
                    warn!(error = %err, "Response stream failed");
                    return Some(Err(err));
                }
                None => {
                    if !self.buffer.is_empty() {
                        let line = std::mem::take(&mut self.buffer);
                        if let Some(item) = self.handle_line(&line) {
                            return Some(item);
                        }
                        if self.finished {
                            return None;
                        }
                    }
                    self.finished = true;
                    return Some(Err(ChatError::protocol(
                        "stream ended before the final record",
                    )));
                }
            }
        }
    }

    /// Drains the stream into one string.
    pub async fn collect_text(mut self) -> Result<String, ChatError> {
        let mut text = String::new();
        while let Some(fragment) = self.next_fragment().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    fn handle_line(&mut self, line: &[u8]) -> Option<Result<String, ChatError>> {
        match parse_record(line) {
            Ok(Record::Skip) => None,
            Ok(Record::Fragment(text)) => {
                self.fragments_seen += 1;
                Some(Ok(text))
            }
            Ok(Record::Done(tail)) => {
                self.finished = true;
                debug!(fragments = self.fragments_seen, "Response stream complete");
                tail.map(Ok)
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

pub(crate) fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Renders a server error body for display, leading with its summary when
/// one can be found.
pub(crate) fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "Server error: <empty>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            if !summary.is_empty() {
                return format!("Server error: {summary}");
            }
        }
        if let Ok(compact) = serde_json::to_string(&json_value) {
            return format!("Server error: {compact}");
        }
    }

    let first_line = trimmed.lines().next().unwrap_or(trimmed);
    format!("Server error: {first_line}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> ChatStream {
        let owned: Vec<Result<Vec<u8>, ChatError>> =
            parts.iter().map(|part| Ok(part.as_bytes().to_vec())).collect();
        ChatStream::from_chunks(owned)
    }

    async fn drain(mut stream: ChatStream) -> (Vec<String>, Option<ChatError>) {
        let mut fragments = Vec::new();
        while let Some(item) = stream.next_fragment().await {
            match item {
                Ok(text) => fragments.push(text),
                Err(err) => return (fragments, Some(err)),
            }
        }
        (fragments, None)
    }

    #[tokio::test]
    async fn records_split_across_chunks_are_reassembled() {
        let stream = chunks(&[
            "{\"message\":{\"content\":\"Hel\"},\"do",
            "ne\":false}\n{\"message\":{\"content\":\"lo\"},\"done\":false}\n\n",
            "{\"message\":{\"content\":\"\"},\"done\":true}\n",
        ]);
        let (fragments, error) = drain(stream).await;
        assert_eq!(fragments, vec!["Hel", "lo"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn empty_fragments_are_skipped_and_done_stops_reading() {
        let stream = chunks(&[
            "{\"message\":{\"content\":\"\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"only\"},\"done\":false}\n",
            "{\"done\":true}\n",
            "{\"message\":{\"content\":\"ignored\"},\"done\":false}\n",
        ]);
        let (fragments, error) = drain(stream).await;
        assert_eq!(fragments, vec!["only"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn error_record_terminates_with_protocol_error() {
        let stream = chunks(&[
            "{\"message\":{\"content\":\"partial\"},\"done\":false}\n",
            "{\"error\":\"model 'nope' not found\"}\n",
        ]);
        let (fragments, error) = drain(stream).await;
        assert_eq!(fragments, vec!["partial"]);
        assert_eq!(
            error,
            Some(ChatError::Protocol("model 'nope' not found".to_string()))
        );
    }

    #[tokio::test]
    async fn final_record_without_newline_is_processed() {
        let stream = chunks(&[
            "{\"message\":{\"content\":\"a\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"b\"},\"done\":true}",
        ]);
        let (fragments, error) = drain(stream).await;
        assert_eq!(fragments, vec!["a", "b"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn truncated_stream_is_a_protocol_error() {
        let stream = chunks(&["{\"message\":{\"content\":\"a\"},\"done\":false}\n"]);
        let (fragments, error) = drain(stream).await;
        assert_eq!(fragments, vec!["a"]);
        assert!(matches!(error, Some(ChatError::Protocol(_))));
    }

    #[tokio::test]
    async fn garbage_line_is_a_protocol_error() {
        let (_, error) = drain(chunks(&["<html>bad gateway</html>\n"])).await;
        assert_eq!(
            error,
            Some(ChatError::Protocol(
                "Server error: <html>bad gateway</html>".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn from_fragments_round_trips_text() {
        let text = ChatStream::from_fragments(["<think>x</think>", "hi"])
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "<think>x</think>hi");
    }

    #[test]
    fn format_api_error_prefers_summary() {
        let raw = r#"{"error":{"message":"model   overloaded","type":"server_error"}}"#;
        assert_eq!(format_api_error(raw), "Server error: model overloaded");
        assert_eq!(
            format_api_error(r#"{"status":"failed"}"#),
            r#"Server error: {"status":"failed"}"#
        );
        assert_eq!(format_api_error("  "), "Server error: <empty>");
    }
}
