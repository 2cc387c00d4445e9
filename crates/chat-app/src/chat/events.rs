use parley_backend::ChatId;

/// Emitted when the viewer picks a chat in the sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatSelected {
    pub chat_id: ChatId,
}

/// Emitted when the viewer submits the composer text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequested {
    pub content: String,
}

/// Emitted when the viewer asks to restore a message that failed to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendRequested;

/// Emitted when the viewer retries a failed message feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryFeedRequested;

impl SendRequested {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}
