//! The chat-side source of "current message" text

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;

/// Identity of a chat message. A change of identity resets playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub text: String,
}

/// Anything that can report the latest chat message, which may still be
/// growing token by token.
pub trait MessageSource: Send + Sync {
    fn latest(&self) -> Option<MessageSnapshot>;
}

/// In-memory message buffer, written by a producer and polled by a session.
#[derive(Debug, Default)]
pub struct SharedMessage {
    current: RwLock<Option<MessageSnapshot>>,
}

impl SharedMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new, empty message.
    pub fn begin(&self, id: MessageId) {
        *self.current.write() = Some(MessageSnapshot {
            id,
            text: String::new(),
        });
    }

    /// Append streamed text to the current message, if any.
    pub fn push_str(&self, chunk: &str) {
        if let Some(snapshot) = self.current.write().as_mut() {
            snapshot.text.push_str(chunk);
        }
    }

    pub fn set(&self, id: MessageId, text: impl Into<String>) {
        *self.current.write() = Some(MessageSnapshot {
            id,
            text: text.into(),
        });
    }
}

impl MessageSource for SharedMessage {
    fn latest(&self) -> Option<MessageSnapshot> {
        self.current.read().clone()
    }
}
