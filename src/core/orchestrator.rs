//! Bounded request/execute/resume loop for tool-enabled turns.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::chat_client::ChatBackend;
use crate::core::error::ChatError;
use crate::core::history::ConversationHistory;
use crate::core::message::Message;
use crate::core::options::ModelOptions;
use crate::core::reply::{show_whole_reply, stream_reply, ResponseView, VisibleReply};
use crate::tools::ToolRegistry;

pub const MAX_TOOL_ITERATIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: VisibleReply,
    /// Number of tool-aware requests made.
    pub iterations: usize,
    pub tool_calls: usize,
    /// The iteration cap was hit before the model stopped asking for tools.
    pub limit_reached: bool,
}

impl TurnOutcome {
    /// Outcome of a turn answered without any tool round-trips.
    pub fn plain(reply: VisibleReply) -> Self {
        Self {
            reply,
            iterations: 0,
            tool_calls: 0,
            limit_reached: false,
        }
    }
}

pub struct ToolOrchestrator<'a> {
    backend: &'a dyn ChatBackend,
    registry: &'a ToolRegistry,
    max_iterations: usize,
}

impl<'a> ToolOrchestrator<'a> {
    pub fn new(backend: &'a dyn ChatBackend, registry: &'a ToolRegistry) -> Self {
        Self {
            backend,
            registry,
            max_iterations: MAX_TOOL_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Runs one user turn. `history` must already hold the user's message.
    ///
    /// On error the history is rolled back to what it was on entry.
    pub async fn run(
        &self,
        history: &mut ConversationHistory,
        model: &str,
        options: &ModelOptions,
        view: &mut dyn ResponseView,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        let checkpoint = history.checkpoint();
        match self.drive(history, model, options, view, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                history.restore(checkpoint);
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        history: &mut ConversationHistory,
        model: &str,
        options: &ModelOptions,
        view: &mut dyn ResponseView,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, ChatError> {
        let tools = self.registry.definitions();
        let mut iterations = 0;
        let mut tool_calls = 0;
        let mut last_content = String::new();
        let mut settled = false;

        while iterations < self.max_iterations {
            iterations += 1;
            let reply = self
                .backend
                .chat_with_tools(model, history.messages(), options, tools)
                .await?;

            if !reply.has_tool_calls() {
                debug!(iteration = iterations, "Model answered without tool calls");
                settled = true;
                break;
            }

            last_content = reply.content.clone();
            let calls = reply.tool_calls.clone();
            info!(
                iteration = iterations,
                count = calls.len(),
                "Model requested tool calls"
            );
            history.append(Message::assistant_tool_calls(reply.content, reply.tool_calls));
            history.trim();

            for call in &calls {
                debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
                let result = self.registry.dispatch(call).await;
                history.append(Message::tool_result(call, result));
                history.trim();
                tool_calls += 1;
            }
        }

        let reply = if settled {
            let stream = self
                .backend
                .chat_stream(model, history.messages(), options)
                .await?;
            stream_reply(stream, view, cancel).await?
        } else {
            warn!(
                iterations,
                tool_calls, "Tool iteration limit reached; answering with last content"
            );
            show_whole_reply(&last_content, view)
        };

        if reply.should_persist() {
            history.append(Message::assistant(reply.text.clone()));
        }
        if history.len() > history.cap() {
            history.prune_tool_transcript();
        }
        history.trim();

        Ok(TurnOutcome {
            reply,
            iterations,
            tool_calls,
            limit_reached: !settled,
        })
    }
}
