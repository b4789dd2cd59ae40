//! Arrival-ordered message list for the active room.

use chat_core::ChatMessage;

/// Append-only sequence of the messages received for one session.
///
/// Order is arrival order.  Timestamps are never consulted, and nothing is
/// deduplicated: a frame delivered twice is stored twice.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.entries.push(message);
    }

    /// Appends a priming batch from the room-history service, in order.
    pub fn extend_history<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = ChatMessage>,
    {
        self.entries.extend(batch);
    }

    /// Returns a copy of the current contents.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.entries.last()
    }
}
