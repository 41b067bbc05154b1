use tracing::debug;

use crate::core::message::Message;

/// Maximum number of messages kept before trimming starts.
pub const HISTORY_CAP: usize = 24;

/// Ordered conversation transcript sent to the model on every request.
///
/// At most one system message exists and it always sits at index 0. Trimming
/// removes the oldest non-system message, one per call.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    cap: usize,
}

/// Snapshot taken before a turn so a failed request can be rolled back.
#[derive(Debug, Clone)]
pub struct HistoryCheckpoint(Vec<Message>);

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::with_cap(HISTORY_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            messages: Vec::new(),
            cap,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Appends a message. A system message replaces the existing one at
    /// index 0 or is inserted there, so the single-system-message rule holds.
    pub fn append(&mut self, message: Message) {
        if !message.is_system() {
            self.messages.push(message);
            return;
        }

        match self.messages.first_mut() {
            Some(first) if first.is_system() => *first = message,
            _ => self.messages.insert(0, message),
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Removes exactly one message when the history exceeds the cap.
    /// Returns whether anything was removed.
    pub fn trim(&mut self) -> bool {
        if self.messages.len() <= self.cap {
            return false;
        }

        let index = if self.messages[0].is_system() { 1 } else { 0 };
        let removed = self.messages.remove(index);
        debug!(role = removed.role.as_str(), index, "Trimmed history");
        true
    }

    /// Drops tool results and tool-call-carrying assistant turns. Only applied
    /// once the history is over the cap, so the latest exchange stays visible
    /// to the model until space is actually needed.
    pub fn prune_tool_transcript(&mut self) -> usize {
        if self.messages.len() <= self.cap {
            return 0;
        }
        let before = self.messages.len();
        self.messages.retain(|message| !message.is_tool_transcript());
        let pruned = before - self.messages.len();
        if pruned > 0 {
            debug!(pruned, "Pruned tool transcript from history");
        }
        pruned
    }

    pub fn checkpoint(&self) -> HistoryCheckpoint {
        HistoryCheckpoint(self.messages.clone())
    }

    pub fn restore(&mut self, checkpoint: HistoryCheckpoint) {
        self.messages = checkpoint.0;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|message| message.is_system())
            .map(|message| message.content.as_str())
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
