use std::sync::Arc;

use parley_backend::{
    ChatBackend, ChatId, FeedEvent, FeedEvents, Message, SubscriptionGuard, SubscriptionWorker,
};

pub const WELCOME_TITLE: &str = "Welcome to AI Chatbot";
pub const WELCOME_HINT: &str =
    "Click on the New Chat button or select a chat to start a conversation.";
pub const EMPTY_FEED_TEXT: &str = "No messages yet. Start the conversation!";
pub const FEED_ERROR_TEXT: &str = "Error loading messages.";

/// Identity of one subscription attempt. A new generation is minted for every attach,
/// so deliveries from a detached subscription never match the active target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedTarget {
    pub chat_id: ChatId,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedView {
    #[default]
    Idle,
    Loading,
    Loaded(Vec<Message>),
    Failed(String),
}

/// What the owner of the subscription has to do after a selection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedChange {
    Unchanged,
    /// Drop the current subscription and keep none.
    Detach,
    /// Drop the current subscription, then open one for this target.
    Attach(FeedTarget),
}

/// Message area state for the selected chat.
#[derive(Debug, Clone, Default)]
pub struct MessageFeed {
    target: Option<FeedTarget>,
    next_generation: u64,
    view: FeedView,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &FeedView {
        &self.view
    }

    pub fn target(&self) -> Option<FeedTarget> {
        self.target
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        self.target.map(|target| target.chat_id)
    }

    pub fn messages(&self) -> &[Message] {
        match &self.view {
            FeedView::Loaded(messages) => messages,
            FeedView::Idle | FeedView::Loading | FeedView::Failed(_) => &[],
        }
    }

    /// Follows the chat selection. Re-selecting the active chat changes nothing.
    pub fn retarget(&mut self, selection: Option<ChatId>) -> FeedChange {
        match selection {
            None if self.target.is_none() => FeedChange::Unchanged,
            None => {
                self.target = None;
                self.view = FeedView::Idle;
                FeedChange::Detach
            }
            Some(chat_id) if self.chat_id() == Some(chat_id) => FeedChange::Unchanged,
            Some(chat_id) => FeedChange::Attach(self.attach(chat_id)),
        }
    }

    /// Re-subscribes the current chat after a failure.
    pub fn retry(&mut self) -> FeedChange {
        match self.target {
            Some(target) => FeedChange::Attach(self.attach(target.chat_id)),
            None => FeedChange::Unchanged,
        }
    }

    /// Mints a new generation for the current chat while keeping loaded messages on screen.
    pub fn renew(&mut self) -> FeedChange {
        let Some(target) = self.target else {
            return FeedChange::Unchanged;
        };
        let shown = std::mem::take(&mut self.view);
        let target = self.attach(target.chat_id);
        if let FeedView::Loaded(_) = shown {
            self.view = shown;
        }
        FeedChange::Attach(target)
    }

    fn attach(&mut self, chat_id: ChatId) -> FeedTarget {
        self.next_generation += 1;
        let target = FeedTarget {
            chat_id,
            generation: self.next_generation,
        };
        self.target = Some(target);
        self.view = FeedView::Loading;
        target
    }

    fn is_active(&self, target: FeedTarget) -> bool {
        self.target == Some(target)
    }

    /// Replaces the rendered list with a delivered snapshot. Returns `false` for
    /// deliveries that belong to a detached subscription.
    pub fn apply(&mut self, target: FeedTarget, messages: Vec<Message>) -> bool {
        if !self.is_active(target) {
            tracing::debug!(chat_id = %target.chat_id, "dropping stale message snapshot");
            return false;
        }
        self.view = FeedView::Loaded(messages);
        true
    }

    /// Shows the inline error for the active target; the selection stays as it is.
    pub fn fail(&mut self, target: FeedTarget, message: impl Into<String>) -> bool {
        if !self.is_active(target) {
            return false;
        }
        let message = message.into();
        tracing::warn!(chat_id = %target.chat_id, error = %message, "message feed failed");
        self.view = FeedView::Failed(FEED_ERROR_TEXT.to_string());
        true
    }

    pub fn deliver(&mut self, target: FeedTarget, event: FeedEvent) -> bool {
        match event {
            FeedEvent::Snapshot(messages) => self.apply(target, messages),
            FeedEvent::Failed(error) => self.fail(target, error.to_string()),
        }
    }
}

/// A subscription the session just opened. The caller polls `worker` on Tokio and
/// feeds `events` back through [`FeedSession::deliver`] tagged with `target`.
pub struct FeedAttachment {
    pub target: FeedTarget,
    pub events: FeedEvents,
    pub worker: SubscriptionWorker,
}

pub enum FeedUpdate {
    Unchanged,
    /// The view changed and nothing is subscribed.
    Closed,
    /// The view changed and a new subscription is open.
    Opened(FeedAttachment),
}

/// The message feed together with the one subscription it renders.
///
/// Every change cancels the open subscription before the backend is asked for the next.
pub struct FeedSession {
    backend: Arc<dyn ChatBackend>,
    feed: MessageFeed,
    guard: Option<SubscriptionGuard>,
}

impl FeedSession {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            feed: MessageFeed::new(),
            guard: None,
        }
    }

    pub fn feed(&self) -> &MessageFeed {
        &self.feed
    }

    pub fn view(&self) -> &FeedView {
        self.feed.view()
    }

    /// Chat of the open subscription, if any.
    pub fn subscribed_chat(&self) -> Option<ChatId> {
        self.guard.as_ref().map(SubscriptionGuard::chat_id)
    }

    pub fn select(&mut self, selection: Option<ChatId>) -> FeedUpdate {
        let change = self.feed.retarget(selection);
        self.apply(change)
    }

    pub fn retry(&mut self) -> FeedUpdate {
        let change = self.feed.retry();
        self.apply(change)
    }

    /// Re-opens the current chat's subscription after the access token changed.
    pub fn reconnect(&mut self) -> FeedUpdate {
        let change = self.feed.renew();
        if let FeedChange::Attach(target) = change {
            tracing::debug!(chat_id = %target.chat_id, "re-opening message feed with a new token");
        }
        self.apply(change)
    }

    pub fn deliver(&mut self, target: FeedTarget, event: FeedEvent) -> bool {
        self.feed.deliver(target, event)
    }

    fn apply(&mut self, change: FeedChange) -> FeedUpdate {
        match change {
            FeedChange::Unchanged => FeedUpdate::Unchanged,
            FeedChange::Detach => {
                self.guard = None;
                FeedUpdate::Closed
            }
            FeedChange::Attach(target) => {
                self.guard = None;
                match self.backend.subscribe_messages(target.chat_id) {
                    Ok(handle) => {
                        let (guard, events) = handle.subscription.split();
                        self.guard = Some(guard);
                        FeedUpdate::Opened(FeedAttachment {
                            target,
                            events,
                            worker: handle.worker,
                        })
                    }
                    Err(error) => {
                        self.feed.fail(target, error.to_string());
                        FeedUpdate::Closed
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use parley_backend::{AuthProvider, BackendCall, FailurePoint, MemoryBackend, Role};

    use super::*;

    async fn signed_in() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.register_verified_user("ada@example.com", "hunter22");
        backend
            .sign_in("ada@example.com", "hunter22")
            .await
            .unwrap();
        backend
    }

    #[test]
    fn no_selection_is_idle_without_a_subscription() {
        let mut feed = MessageFeed::new();
        assert_eq!(feed.retarget(None), FeedChange::Unchanged);
        assert_eq!(feed.view(), &FeedView::Idle);
    }

    #[test]
    fn reselecting_the_same_chat_is_a_no_op() {
        let mut feed = MessageFeed::new();
        let chat = ChatId::new_v4();
        assert!(matches!(feed.retarget(Some(chat)), FeedChange::Attach(_)));
        assert_eq!(feed.retarget(Some(chat)), FeedChange::Unchanged);
    }

    fn opened(update: FeedUpdate) -> FeedAttachment {
        match update {
            FeedUpdate::Opened(attachment) => attachment,
            FeedUpdate::Unchanged | FeedUpdate::Closed => panic!("expected a new subscription"),
        }
    }

    #[tokio::test]
    async fn switching_chats_keeps_one_live_subscription() {
        let backend = signed_in().await.shared();
        let a = backend.create_chat().await.unwrap().id;
        let b = backend.create_chat().await.unwrap().id;
        let mut session = FeedSession::new(backend.clone());

        // Event streams stay alive so only the session's own cancellation counts.
        let first = opened(session.select(Some(a)));
        assert_eq!(backend.live_subscriptions(), vec![a]);

        let second = opened(session.select(Some(b)));
        assert_eq!(backend.live_subscriptions(), vec![b]);
        assert_eq!(session.subscribed_chat(), Some(b));
        assert!(matches!(session.select(Some(b)), FeedUpdate::Unchanged));

        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::CreateChat,
                BackendCall::CreateChat,
                BackendCall::SubscribeMessages(a),
                BackendCall::SubscribeMessages(b),
            ]
        );

        assert!(matches!(session.select(None), FeedUpdate::Closed));
        assert!(backend.live_subscriptions().is_empty());
        assert_eq!(session.view(), &FeedView::Idle);
        drop((first, second));
    }

    #[tokio::test]
    async fn renders_delivered_order_and_rejects_stale_snapshots() {
        let backend = signed_in().await.shared();
        let a = backend.create_chat().await.unwrap().id;
        let b = backend.create_chat().await.unwrap().id;
        backend.push_message(a, Role::User, "first");
        backend.push_message(a, Role::Assistant, "second");
        let mut session = FeedSession::new(backend.clone());

        let mut on_a = opened(session.select(Some(a)));
        let stale = on_a.events.recv().await.unwrap();

        let mut on_b = opened(session.select(Some(b)));
        assert!(!session.deliver(on_a.target, stale));
        assert_eq!(session.view(), &FeedView::Loading);

        assert!(session.deliver(on_b.target, on_b.events.recv().await.unwrap()));
        assert_eq!(session.view(), &FeedView::Loaded(Vec::new()));

        let mut back_on_a = opened(session.select(Some(a)));
        assert!(session.deliver(back_on_a.target, back_on_a.events.recv().await.unwrap()));
        let contents = session
            .feed()
            .messages()
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn token_rotation_reopens_the_active_subscription() {
        let backend = signed_in().await.shared();
        let chat = backend.create_chat().await.unwrap().id;
        backend.push_message(chat, Role::User, "hello");
        let mut session = FeedSession::new(backend.clone());
        let mut epoch_rx = backend.watch_token_epoch();

        let mut first = opened(session.select(Some(chat)));
        assert!(session.deliver(first.target, first.events.recv().await.unwrap()));

        backend.refresh().await.unwrap();
        assert!(epoch_rx.changed().await.is_ok());

        let mut second = opened(session.reconnect());
        assert_eq!(second.target.chat_id, chat);
        assert_ne!(second.target.generation, first.target.generation);
        assert_eq!(backend.live_subscriptions(), vec![chat]);
        // The loaded messages stay visible while the new subscription starts.
        assert_eq!(session.feed().messages().len(), 1);

        assert!(!session.deliver(first.target, FeedEvent::Snapshot(Vec::new())));
        backend.push_message(chat, Role::Assistant, "again");
        let _initial = second.events.recv().await.unwrap();
        assert!(session.deliver(second.target, second.events.recv().await.unwrap()));
        assert_eq!(session.feed().messages().len(), 2);
        assert_eq!(
            backend
                .calls()
                .iter()
                .filter(|call| **call == BackendCall::SubscribeMessages(chat))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn reconnect_without_a_selection_does_nothing() {
        let backend = signed_in().await.shared();
        let mut session = FeedSession::new(backend.clone());
        assert!(matches!(session.reconnect(), FeedUpdate::Unchanged));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn subscribe_error_shows_the_inline_failure() {
        let backend = signed_in().await.shared();
        let chat = backend.create_chat().await.unwrap().id;
        backend.fail_next(FailurePoint::SubscribeMessages);
        let mut session = FeedSession::new(backend.clone());

        let mut attempt = opened(session.select(Some(chat)));
        assert!(session.deliver(attempt.target, attempt.events.recv().await.unwrap()));
        assert_eq!(session.view(), &FeedView::Failed(FEED_ERROR_TEXT.to_string()));

        let mut retried = opened(session.retry());
        assert!(session.deliver(retried.target, retried.events.recv().await.unwrap()));
        assert_eq!(session.view(), &FeedView::Loaded(Vec::new()));
    }

    #[test]
    fn failure_keeps_selection_and_retry_mints_a_new_target() {
        let mut feed = MessageFeed::new();
        let chat = ChatId::new_v4();
        let FeedChange::Attach(first) = feed.retarget(Some(chat)) else {
            panic!("expected attach");
        };

        assert!(feed.fail(first, "socket closed"));
        assert_eq!(feed.view(), &FeedView::Failed(FEED_ERROR_TEXT.to_string()));
        assert_eq!(feed.chat_id(), Some(chat));

        let FeedChange::Attach(second) = feed.retry() else {
            panic!("retry must re-attach");
        };
        assert_eq!(second.chat_id, chat);
        assert_ne!(second.generation, first.generation);
        assert_eq!(feed.view(), &FeedView::Loading);
        assert!(!feed.apply(first, Vec::new()));
    }

    #[test]
    fn clearing_the_selection_detaches() {
        let mut feed = MessageFeed::new();
        feed.retarget(Some(ChatId::new_v4()));
        assert_eq!(feed.retarget(None), FeedChange::Detach);
        assert_eq!(feed.view(), &FeedView::Idle);
        assert_eq!(feed.retry(), FeedChange::Unchanged);
    }
}
