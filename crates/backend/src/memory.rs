use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, oneshot, watch};

use super::error::{AuthError, AuthResult, BackendError, BackendResult};
use super::ids::{ChatId, MessageId, UserId};
use super::subscription::{FeedEvent, SubscriptionHandle, make_feed_channel};
use super::types::{AuthStatus, Chat, Message, Role, Session, SignUpOutcome, User};
use super::{AuthProvider, BoxFuture, ChatBackend};

/// One collaborator call as observed by the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    ListChats,
    CreateChat,
    SubscribeMessages(ChatId),
    InsertUserMessage(ChatId, String),
    RequestBotReply(ChatId, String),
}

/// Operations that can be told to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    ListChats,
    CreateChat,
    SubscribeMessages,
    InsertUserMessage,
    RequestBotReply,
}

struct Account {
    id: UserId,
    password: String,
    verified: bool,
}

struct Subscriber {
    chat_id: ChatId,
    events_tx: mpsc::UnboundedSender<FeedEvent>,
    cancel_rx: oneshot::Receiver<()>,
}

impl Subscriber {
    /// Live until the guard fires or the event stream is dropped.
    fn is_live(&mut self) -> bool {
        !self.events_tx.is_closed()
            && matches!(
                self.cancel_rx.try_recv(),
                Err(oneshot::error::TryRecvError::Empty)
            )
    }
}

struct MemoryState {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    token_serial: u64,
    chats: Vec<Chat>,
    messages: Vec<Message>,
    subscribers: Vec<Subscriber>,
    calls: Vec<BackendCall>,
    failures: Vec<FailurePoint>,
    clock: DateTime<Utc>,
    require_verification: bool,
}

impl MemoryState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }

    fn take_failure(&mut self, point: FailurePoint) -> bool {
        if let Some(index) = self.failures.iter().position(|failure| *failure == point) {
            self.failures.remove(index);
            true
        } else {
            false
        }
    }

    fn chat_messages(&self, chat_id: ChatId) -> Vec<Message> {
        let mut messages = self
            .messages
            .iter()
            .filter(|message| message.chat_id == chat_id)
            .cloned()
            .collect::<Vec<_>>();
        messages.sort_by_key(|message| message.created_at);
        messages
    }

    fn publish(&mut self, chat_id: ChatId) {
        let snapshot = self.chat_messages(chat_id);
        self.subscribers.retain_mut(Subscriber::is_live);
        for subscriber in self.subscribers.iter().filter(|s| s.chat_id == chat_id) {
            let _ = subscriber
                .events_tx
                .send(FeedEvent::Snapshot(snapshot.clone()));
        }
    }

    fn require_session(&self, stage: &'static str) -> BackendResult<()> {
        if self.session.is_some() {
            Ok(())
        } else {
            Err(BackendError::NotAuthenticated { stage })
        }
    }

    fn ensure_chat(&self, stage: &'static str, chat_id: ChatId) -> BackendResult<()> {
        if self.chats.iter().any(|chat| chat.id == chat_id) {
            Ok(())
        } else {
            Err(BackendError::UnknownChat {
                stage,
                chat_id: chat_id.to_string(),
            })
        }
    }
}

fn injected(stage: &'static str) -> BackendError {
    BackendError::Status {
        stage,
        status: 500,
        body: "injected failure".to_string(),
    }
}

/// In-process stand-in for both collaborators.
///
/// Keeps accounts, chats and messages in memory, fans message snapshots out to live
/// subscribers and answers every user message with an echo from the assistant.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    status: watch::Sender<AuthStatus>,
    token_epoch: watch::Sender<u64>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend whose sign-ups must be verified before sign-in succeeds.
    pub fn new() -> Self {
        let (status, _) = watch::channel(AuthStatus::Unauthenticated);
        let (token_epoch, _) = watch::channel(0);
        Self {
            state: Mutex::new(MemoryState {
                accounts: HashMap::new(),
                session: None,
                token_serial: 0,
                chats: Vec::new(),
                messages: Vec::new(),
                subscribers: Vec::new(),
                calls: Vec::new(),
                failures: Vec::new(),
                clock: Utc::now(),
                require_verification: true,
            }),
            status,
            token_epoch,
        }
    }

    /// Backend that signs new accounts in immediately, used for offline runs.
    pub fn without_verification() -> Self {
        let backend = Self::new();
        backend.lock().require_verification = false;
        backend
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register_verified_user(&self, email: &str, password: &str) {
        self.lock().accounts.insert(
            email.to_string(),
            Account {
                id: UserId::new_v4(),
                password: password.to_string(),
                verified: true,
            },
        );
    }

    pub fn verify_email(&self, email: &str) -> bool {
        match self.lock().accounts.get_mut(email) {
            Some(account) => {
                account.verified = true;
                true
            }
            None => false,
        }
    }

    /// Seeds an existing chat with a fixed creation time.
    pub fn seed_chat(&self, id: ChatId, created_at: DateTime<Utc>) {
        let mut state = self.lock();
        state.chats.push(Chat::new(id, created_at));
        state.chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    /// Stores a message as if another client or the bot had written it, notifying subscribers.
    pub fn push_message(&self, chat_id: ChatId, role: Role, content: &str) -> Message {
        let mut state = self.lock();
        let message = Message {
            id: MessageId::new_v4(),
            chat_id,
            role,
            content: content.to_string(),
            created_at: state.tick(),
        };
        state.messages.push(message.clone());
        state.publish(chat_id);
        message
    }

    pub fn fail_next(&self, point: FailurePoint) {
        self.lock().failures.push(point);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Chats with at least one subscriber whose handle is still alive.
    pub fn live_subscriptions(&self) -> Vec<ChatId> {
        let mut state = self.lock();
        state.subscribers.retain_mut(Subscriber::is_live);
        state
            .subscribers
            .iter()
            .map(|subscriber| subscriber.chat_id)
            .collect()
    }

    fn start_session(&self, state: &mut MemoryState, email: &str, user_id: UserId) -> Session {
        let user = User {
            id: user_id,
            email: Some(email.to_string()),
            display_name: email.to_string(),
            email_verified: !state.require_verification,
        };
        let session = self.issue_tokens(state, user);
        self.status.send_replace(AuthStatus::Authenticated);
        session
    }

    fn issue_tokens(&self, state: &mut MemoryState, user: User) -> Session {
        state.token_serial += 1;
        let serial = state.token_serial;
        let session = Session {
            access_token: format!("memory-access-{}-{serial}", user.id),
            access_token_expires_in: 900,
            refresh_token: format!("memory-refresh-{}-{serial}", user.id),
            user,
        };
        state.session = Some(session.clone());
        self.token_epoch.send_modify(|epoch| *epoch += 1);
        session
    }

    fn refresh_now(&self) -> AuthResult<Session> {
        let mut state = self.lock();
        let user = state
            .session
            .as_ref()
            .map(|session| session.user.clone())
            .ok_or(AuthError::NotSignedIn {
                stage: "refresh-token",
            })?;
        Ok(self.issue_tokens(&mut state, user))
    }

    fn sign_up_now(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        let mut state = self.lock();
        if state.accounts.contains_key(email) {
            return Err(AuthError::Rejected {
                stage: "sign-up",
                status: 409,
                message: "Email already in use".to_string(),
            });
        }

        let user_id = UserId::new_v4();
        let verified = !state.require_verification;
        state.accounts.insert(
            email.to_string(),
            Account {
                id: user_id,
                password: password.to_string(),
                verified,
            },
        );

        if verified {
            Ok(SignUpOutcome::Session(
                self.start_session(&mut state, email, user_id),
            ))
        } else {
            Ok(SignUpOutcome::VerificationPending)
        }
    }

    fn sign_in_now(&self, email: &str, password: &str) -> AuthResult<Session> {
        let mut state = self.lock();
        let (user_id, verified) = match state.accounts.get(email) {
            Some(account) if account.password == password => (account.id, account.verified),
            _ => {
                return Err(AuthError::InvalidCredentials {
                    stage: "sign-in",
                    message: "Incorrect email or password".to_string(),
                });
            }
        };

        if !verified {
            return Err(AuthError::Unverified {
                stage: "sign-in",
                message: "Email is not verified".to_string(),
            });
        }

        Ok(self.start_session(&mut state, email, user_id))
    }

    fn sign_out_now(&self) {
        let mut state = self.lock();
        state.session = None;
        // Hasura drops subscriptions of a signed-out viewer.
        state.subscribers.clear();
        self.status.send_replace(AuthStatus::Unauthenticated);
    }

    fn list_chats_now(&self) -> BackendResult<Vec<Chat>> {
        let mut state = self.lock();
        state.calls.push(BackendCall::ListChats);
        state.require_session("list-chats")?;
        if state.take_failure(FailurePoint::ListChats) {
            return Err(injected("list-chats"));
        }
        Ok(state.chats.clone())
    }

    fn create_chat_now(&self) -> BackendResult<Chat> {
        let mut state = self.lock();
        state.calls.push(BackendCall::CreateChat);
        state.require_session("create-chat")?;
        if state.take_failure(FailurePoint::CreateChat) {
            return Err(injected("create-chat"));
        }
        let chat = Chat::new(ChatId::new_v4(), state.tick());
        state.chats.insert(0, chat.clone());
        Ok(chat)
    }

    fn insert_user_message_now(&self, chat_id: ChatId, content: &str) -> BackendResult<Message> {
        let mut state = self.lock();
        let stage = "insert-user-message";
        state
            .calls
            .push(BackendCall::InsertUserMessage(chat_id, content.to_string()));
        state.require_session(stage)?;
        if state.take_failure(FailurePoint::InsertUserMessage) {
            return Err(injected(stage));
        }
        state.ensure_chat(stage, chat_id)?;

        let message = Message {
            id: MessageId::new_v4(),
            chat_id,
            role: Role::User,
            content: content.to_string(),
            created_at: state.tick(),
        };
        state.messages.push(message.clone());
        state.publish(chat_id);
        Ok(message)
    }

    fn request_bot_reply_now(&self, chat_id: ChatId, content: &str) -> BackendResult<Message> {
        let mut state = self.lock();
        let stage = "request-bot-reply";
        state
            .calls
            .push(BackendCall::RequestBotReply(chat_id, content.to_string()));
        state.require_session(stage)?;
        if state.take_failure(FailurePoint::RequestBotReply) {
            return Err(injected(stage));
        }
        state.ensure_chat(stage, chat_id)?;

        let reply = Message {
            id: MessageId::new_v4(),
            chat_id,
            role: Role::Assistant,
            content: format!("You said: {}", content.trim()),
            created_at: state.tick(),
        };
        state.messages.push(reply.clone());
        state.publish(chat_id);
        Ok(reply)
    }
}

impl AuthProvider for MemoryBackend {
    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, AuthResult<SignUpOutcome>> {
        Box::pin(async move { self.sign_up_now(email, password) })
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, AuthResult<Session>> {
        Box::pin(async move { self.sign_in_now(email, password) })
    }

    fn sign_out(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move {
            self.sign_out_now();
            Ok(())
        })
    }

    fn refresh(&self) -> BoxFuture<'_, AuthResult<Session>> {
        Box::pin(async move { self.refresh_now() })
    }

    fn status(&self) -> AuthStatus {
        *self.status.borrow()
    }

    fn watch_status(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    fn watch_token_epoch(&self) -> watch::Receiver<u64> {
        self.token_epoch.subscribe()
    }

    fn session(&self) -> Option<Session> {
        self.lock().session.clone()
    }
}

impl ChatBackend for MemoryBackend {
    fn list_chats(&self) -> BoxFuture<'_, BackendResult<Vec<Chat>>> {
        Box::pin(async move { self.list_chats_now() })
    }

    fn create_chat(&self) -> BoxFuture<'_, BackendResult<Chat>> {
        Box::pin(async move { self.create_chat_now() })
    }

    fn subscribe_messages(&self, chat_id: ChatId) -> BackendResult<SubscriptionHandle> {
        let mut state = self.lock();
        let stage = "subscribe-messages";
        state.calls.push(BackendCall::SubscribeMessages(chat_id));
        state.require_session(stage)?;

        let (events_tx, subscription, cancel_rx) = make_feed_channel(chat_id);
        if state.take_failure(FailurePoint::SubscribeMessages) {
            let _ = events_tx.send(FeedEvent::Failed(injected(stage)));
        } else {
            let _ = events_tx.send(FeedEvent::Snapshot(state.chat_messages(chat_id)));
            state.subscribers.push(Subscriber {
                chat_id,
                events_tx,
                cancel_rx,
            });
        }

        // Pushes come from `publish`, which also prunes cancelled subscribers.
        let worker = Box::pin(async {});

        Ok(SubscriptionHandle {
            subscription,
            worker,
        })
    }

    fn insert_user_message<'a>(
        &'a self,
        chat_id: ChatId,
        content: &'a str,
    ) -> BoxFuture<'a, BackendResult<Message>> {
        Box::pin(async move { self.insert_user_message_now(chat_id, content) })
    }

    fn request_bot_reply<'a>(
        &'a self,
        chat_id: ChatId,
        content: &'a str,
    ) -> BoxFuture<'a, BackendResult<Message>> {
        Box::pin(async move { self.request_bot_reply_now(chat_id, content) })
    }
}
