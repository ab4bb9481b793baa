use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Opaque message identifier, unique for the lifetime of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl From<u64> for MessageId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Who a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
    Error,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
            Sender::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Local>,
}

/// Ordered message collection; insertion order is display order
#[derive(Debug)]
pub struct TranscriptStore {
    messages: Vec<Message>,
    next_id: u64,
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            next_id: 1,
        }
    }

    /// Insert a message at the end and return its fresh identifier
    pub fn append(&mut self, sender: Sender, text: impl Into<String>) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.messages.push(Message {
            id,
            sender,
            text: text.into(),
            created_at: Local::now(),
        });
        id
    }

    /// Replace the text of an assistant message.
    ///
    /// Returns false without touching anything if the message is gone or
    /// is not an assistant message.
    pub fn update_text(&mut self, id: MessageId, text: impl Into<String>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) if message.sender == Sender::Assistant => {
                message.text = text.into();
                true
            }
            Some(message) => {
                debug!(id = %id, sender = %message.sender, "Ignoring update to immutable message");
                false
            }
            None => false,
        }
    }

    /// Remove a message; returns whether it existed
    pub fn delete(&mut self, id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Read-only view of the transcript in order
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
