//! Drives a model reply through the think filter into the display layer.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::chat_stream::ChatStream;
use crate::core::error::ChatError;
use crate::core::think_filter::ThinkFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEnd {
    Complete,
    Interrupted,
    Failed,
}

/// Display surface for assistant replies and status lines.
pub trait ResponseView: Send {
    fn begin_response(&mut self);

    /// Newly visible text. `thinking` is true while a reasoning segment is
    /// being held back.
    fn show_delta(&mut self, delta: &str, thinking: bool);

    fn end_response(&mut self, visible: &str, end: ResponseEnd);

    fn notice(&mut self, text: &str);

    fn error(&mut self, text: &str);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleReply {
    pub text: String,
    pub interrupted: bool,
}

impl VisibleReply {
    /// Interrupted replies with nothing visible are not worth keeping.
    pub fn should_persist(&self) -> bool {
        !(self.interrupted && self.text.trim().is_empty())
    }
}

/// Consumes `stream` one fragment at a time until it ends, fails, or `cancel`
/// fires.
pub async fn stream_reply(
    mut stream: ChatStream,
    view: &mut dyn ResponseView,
    cancel: &CancellationToken,
) -> Result<VisibleReply, ChatError> {
    let mut filter = ThinkFilter::new();
    view.begin_response();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let delta = filter.interrupt();
                if !delta.is_empty() {
                    view.show_delta(&delta, false);
                }
                info!(visible_len = filter.visible().len(), "Streaming interrupted by user");
                view.end_response(filter.visible(), ResponseEnd::Interrupted);
                return Ok(VisibleReply {
                    text: filter.into_visible(),
                    interrupted: true,
                });
            }
            next = stream.next_fragment() => match next {
                Some(Ok(fragment)) => {
                    let delta = filter.push(&fragment);
                    view.show_delta(&delta, filter.is_suppressing());
                }
                Some(Err(err)) => {
                    warn!(error = %err, "Streaming failed");
                    view.end_response(filter.visible(), ResponseEnd::Failed);
                    return Err(err);
                }
                None => {
                    let delta = filter.finish();
                    if !delta.is_empty() {
                        view.show_delta(&delta, false);
                    }
                    view.end_response(filter.visible(), ResponseEnd::Complete);
                    return Ok(VisibleReply {
                        text: filter.into_visible(),
                        interrupted: false,
                    });
                }
            }
        }
    }
}

/// Displays an already complete reply after running the filter over it once.
pub fn show_whole_reply(text: &str, view: &mut dyn ResponseView) -> VisibleReply {
    let visible = ThinkFilter::apply(text);
    view.begin_response();
    if !visible.is_empty() {
        view.show_delta(&visible, false);
    }
    view.end_response(&visible, ResponseEnd::Complete);
    VisibleReply {
        text: visible,
        interrupted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::RecordingView;

    #[tokio::test]
    async fn streamed_reply_hides_reasoning() {
        let stream = ChatStream::from_fragments(["<think>", "plan", "</think>", "\nAhoy", "!"]);
        let mut view = RecordingView::default();
        let reply = stream_reply(stream, &mut view, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.text, "Ahoy!");
        assert!(!reply.interrupted);
        assert_eq!(view.shown, "Ahoy!");
        assert!(view.thinking_updates >= 2);
        assert_eq!(view.finished, vec![("Ahoy!".to_string(), ResponseEnd::Complete)]);
    }

    #[tokio::test]
    async fn cancelled_stream_keeps_visible_prefix_only() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = ChatStream::from_fragments(["never shown"]);
        let mut view = RecordingView::default();
        let reply = stream_reply(stream, &mut view, &cancel).await.unwrap();

        assert!(reply.interrupted);
        assert_eq!(reply.text, "");
        assert!(!reply.should_persist());
        assert_eq!(view.finished[0].1, ResponseEnd::Interrupted);
    }

    #[tokio::test]
    async fn stream_errors_propagate() {
        let stream = ChatStream::from_chunks(vec![
            Ok(b"{\"message\":{\"content\":\"par\"},\"done\":false}\n".to_vec()),
            Err(ChatError::network("connection reset")),
        ]);
        let mut view = RecordingView::default();
        let err = stream_reply(stream, &mut view, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, ChatError::Network("connection reset".to_string()));
        assert_eq!(view.finished[0].1, ResponseEnd::Failed);
    }

    #[test]
    fn whole_reply_uses_same_filter() {
        let mut view = RecordingView::default();
        let reply = show_whole_reply("<think>secret", &mut view);
        assert_eq!(reply.text, "");
        assert_eq!(view.shown, "");
    }
}
