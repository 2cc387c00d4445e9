use std::collections::{HashMap, HashSet};

use parley_backend::{BackendError, BackendResult, ChatBackend, ChatId, Message};

pub const INPUT_PLACEHOLDER: &str = "Type your message...";
pub const RESEND_LABEL: &str = "Resend";

/// A message accepted by the composer and not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub chat_id: ChatId,
    pub content: String,
}

/// Both writes of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub user_message: Message,
    pub reply: Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FailedDraft {
    content: String,
    notice: String,
}

/// Per-chat send bookkeeping for the message input.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    busy: HashSet<ChatId>,
    failed_drafts: HashMap<ChatId, FailedDraft>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `text` for the selected chat, or returns `None` when nothing may be sent.
    ///
    /// On acceptance the caller clears the input right away and the chat stays busy
    /// until [`Composer::finish`].
    pub fn prepare(&mut self, text: &str, selection: Option<ChatId>) -> Option<Outgoing> {
        let chat_id = selection?;
        if text.trim().is_empty() || self.busy.contains(&chat_id) {
            return None;
        }

        self.busy.insert(chat_id);
        self.failed_drafts.remove(&chat_id);
        Some(Outgoing {
            chat_id,
            content: text.to_string(),
        })
    }

    pub fn finish(&mut self, outgoing: &Outgoing, result: &BackendResult<SendReceipt>) {
        self.busy.remove(&outgoing.chat_id);
        match result {
            Ok(receipt) => {
                tracing::debug!(
                    chat_id = %outgoing.chat_id,
                    reply_id = %receipt.reply.id,
                    "message sent"
                );
            }
            Err(error) => {
                tracing::error!(chat_id = %outgoing.chat_id, %error, "failed to send message");
                self.failed_drafts.insert(
                    outgoing.chat_id,
                    FailedDraft {
                        content: outgoing.content.clone(),
                        notice: describe_failure(error),
                    },
                );
            }
        }
    }

    pub fn is_busy(&self, chat_id: ChatId) -> bool {
        self.busy.contains(&chat_id)
    }

    pub fn failed_draft(&self, chat_id: ChatId) -> Option<&str> {
        self.failed_drafts
            .get(&chat_id)
            .map(|draft| draft.content.as_str())
    }

    /// Line shown next to the Resend control while a failed draft is kept.
    pub fn failure_notice(&self, chat_id: ChatId) -> Option<&str> {
        self.failed_drafts
            .get(&chat_id)
            .map(|draft| draft.notice.as_str())
    }

    /// Hands the failed text back to the input for another attempt.
    pub fn take_failed_draft(&mut self, chat_id: ChatId) -> Option<String> {
        self.failed_drafts
            .remove(&chat_id)
            .map(|draft| draft.content)
    }
}

/// Stores the user's message, then asks the bot to answer it.
///
/// The reply request is only issued once the insert has succeeded.
pub async fn send(backend: &dyn ChatBackend, outgoing: &Outgoing) -> BackendResult<SendReceipt> {
    let user_message = backend
        .insert_user_message(outgoing.chat_id, &outgoing.content)
        .await?;
    let reply = backend
        .request_bot_reply(outgoing.chat_id, &outgoing.content)
        .await?;

    Ok(SendReceipt {
        user_message,
        reply,
    })
}

/// Plain-language reason for a failed send. The full error goes to the log.
pub fn describe_failure(error: &BackendError) -> String {
    let reason = match error {
        BackendError::Http { .. } | BackendError::WebSocket { .. } => {
            "the server could not be reached"
        }
        BackendError::NotAuthenticated { .. } => "you are signed out",
        BackendError::UnknownChat { .. } => "this chat no longer exists",
        BackendError::Status { .. }
        | BackendError::GraphQl { .. }
        | BackendError::Decode { .. }
        | BackendError::MissingData { .. }
        | BackendError::Protocol { .. }
        | BackendError::InvalidId { .. } => "the server could not process it",
    };
    format!("Message not sent: {reason}.")
}

#[cfg(test)]
mod tests {
    use parley_backend::{AuthProvider, BackendCall, FailurePoint, MemoryBackend, Role};

    use super::*;

    async fn backend_with_chat() -> (MemoryBackend, ChatId) {
        let backend = MemoryBackend::new();
        backend.register_verified_user("ada@example.com", "hunter22");
        backend
            .sign_in("ada@example.com", "hunter22")
            .await
            .unwrap();
        let chat = backend.create_chat().await.unwrap();
        backend.clear_calls();
        (backend, chat.id)
    }

    #[tokio::test]
    async fn blank_text_or_missing_selection_writes_nothing() {
        let (backend, chat) = backend_with_chat().await;
        let mut composer = Composer::new();

        assert!(composer.prepare("", Some(chat)).is_none());
        assert!(composer.prepare("   ", Some(chat)).is_none());
        assert!(composer.prepare("\n\t", Some(chat)).is_none());
        assert!(composer.prepare("hello", None).is_none());

        assert!(!composer.is_busy(chat));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn insert_completes_before_the_bot_is_asked() {
        let (backend, chat) = backend_with_chat().await;
        let mut composer = Composer::new();

        let outgoing = composer.prepare("What is Rust?", Some(chat)).unwrap();
        assert!(composer.is_busy(chat));
        assert!(composer.prepare("again", Some(chat)).is_none());

        let result = send(&backend, &outgoing).await;
        composer.finish(&outgoing, &result);

        let receipt = result.unwrap();
        assert_eq!(receipt.user_message.role, Role::User);
        assert_eq!(receipt.reply.role, Role::Assistant);
        assert!(receipt.user_message.created_at < receipt.reply.created_at);
        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::InsertUserMessage(chat, "What is Rust?".to_string()),
                BackendCall::RequestBotReply(chat, "What is Rust?".to_string()),
            ]
        );
        assert!(!composer.is_busy(chat));
    }

    #[tokio::test]
    async fn failed_insert_skips_the_bot_and_keeps_a_draft() {
        let (backend, chat) = backend_with_chat().await;
        backend.fail_next(FailurePoint::InsertUserMessage);
        let mut composer = Composer::new();

        let outgoing = composer.prepare("hello", Some(chat)).unwrap();
        let result = send(&backend, &outgoing).await;
        composer.finish(&outgoing, &result);

        assert!(result.is_err());
        assert_eq!(
            backend.calls(),
            vec![BackendCall::InsertUserMessage(chat, "hello".to_string())]
        );
        assert!(!composer.is_busy(chat));
        assert_eq!(composer.failed_draft(chat), Some("hello"));
        assert_eq!(composer.take_failed_draft(chat).as_deref(), Some("hello"));
        assert!(composer.failed_draft(chat).is_none());
        assert!(composer.failure_notice(chat).is_none());
    }

    #[test]
    fn failure_notice_hides_transport_details() {
        let error = BackendError::NotAuthenticated {
            stage: "insert-user-message",
        };
        let notice = describe_failure(&error);
        assert_eq!(notice, "Message not sent: you are signed out.");
        assert!(!notice.contains("insert-user-message"));
    }

    #[tokio::test]
    async fn busy_chat_does_not_block_other_chats() {
        let (backend, first) = backend_with_chat().await;
        let second = backend.create_chat().await.unwrap().id;
        let mut composer = Composer::new();

        let pending = composer.prepare("one", Some(first)).unwrap();
        assert!(composer.prepare("two", Some(second)).is_some());
        assert!(composer.is_busy(first));
        assert!(composer.is_busy(second));

        let result = send(&backend, &pending).await;
        composer.finish(&pending, &result);
        assert!(!composer.is_busy(first));
        assert!(composer.is_busy(second));
    }

    #[tokio::test]
    async fn new_send_clears_an_old_failed_draft() {
        let (backend, chat) = backend_with_chat().await;
        backend.fail_next(FailurePoint::RequestBotReply);
        let mut composer = Composer::new();

        let outgoing = composer.prepare("hello", Some(chat)).unwrap();
        let result = send(&backend, &outgoing).await;
        composer.finish(&outgoing, &result);
        assert!(result.is_err());
        assert_eq!(composer.failed_draft(chat), Some("hello"));
        assert_eq!(
            composer.failure_notice(chat),
            Some("Message not sent: the server could not process it.")
        );

        composer.prepare("different", Some(chat)).unwrap();
        assert!(composer.failed_draft(chat).is_none());
    }
}
