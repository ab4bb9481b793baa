//! Chat events for renderers
//!
//! Published on a broadcast channel while a question is in flight. Every
//! update carries the full accumulated text, so a renderer that lags and
//! misses intermediate updates never loses content.

use crate::transcript::{MessageId, Sender};

/// Capacity of the chat event channel
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// A question was accepted and is being answered
    Loading,
    /// A message was appended to the transcript
    MessageAdded {
        id: MessageId,
        sender: Sender,
        text: String,
    },
    /// An assistant message grew
    MessageUpdated { id: MessageId, text: String },
    /// A message was removed from the transcript
    MessageDeleted { id: MessageId },
    /// Every message was removed
    Cleared,
    /// Streaming failed; the one-shot request is taking over
    FallbackEngaged { reason: String },
    /// The submission is over, whatever the outcome
    Idle,
}
