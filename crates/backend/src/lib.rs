//! Typed client for the hosted chat platform: the Nhost auth service, the Hasura
//! GraphQL API and its live message feed, plus an in-process stand-in used by tests
//! and offline runs.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::watch;

pub mod auth;
pub mod endpoints;
pub mod error;
pub mod graphql;
pub mod ids;
pub mod memory;
pub mod subscription;
pub mod types;

pub use auth::{NhostAuth, keep_session_fresh};
pub use endpoints::BackendEndpoints;
pub use error::{AuthError, AuthResult, BackendError, BackendResult};
pub use graphql::HasuraClient;
pub use ids::{ChatId, MessageId, UserId};
pub use memory::{BackendCall, FailurePoint, MemoryBackend};
pub use subscription::{
    FeedEvent, FeedEvents, MessageSubscription, SubscriptionGuard, SubscriptionHandle,
    SubscriptionWorker,
};
pub use types::{AuthStatus, Chat, Message, Role, Session, SignUpOutcome, User};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Authentication collaborator. Owns the session; everything else only observes it.
pub trait AuthProvider: Send + Sync {
    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, AuthResult<SignUpOutcome>>;
    fn sign_in<'a>(&'a self, email: &'a str, password: &'a str)
    -> BoxFuture<'a, AuthResult<Session>>;
    fn sign_out(&self) -> BoxFuture<'_, AuthResult<()>>;
    fn refresh(&self) -> BoxFuture<'_, AuthResult<Session>>;
    fn status(&self) -> AuthStatus;
    fn watch_status(&self) -> watch::Receiver<AuthStatus>;
    /// Counter bumped each time a new access token is stored. Connections that carry
    /// the token re-open when it moves.
    fn watch_token_epoch(&self) -> watch::Receiver<u64>;
    fn session(&self) -> Option<Session>;

    fn access_token(&self) -> Option<String> {
        self.session().map(|session| session.access_token)
    }
}

/// Conversational data collaborator backed by the GraphQL API.
pub trait ChatBackend: Send + Sync {
    /// Chats ordered by creation time, newest first.
    fn list_chats(&self) -> BoxFuture<'_, BackendResult<Vec<Chat>>>;
    fn create_chat(&self) -> BoxFuture<'_, BackendResult<Chat>>;
    /// Opens a live feed of the chat's messages, oldest first.
    fn subscribe_messages(&self, chat_id: ChatId) -> BackendResult<SubscriptionHandle>;
    fn insert_user_message<'a>(
        &'a self,
        chat_id: ChatId,
        content: &'a str,
    ) -> BoxFuture<'a, BackendResult<Message>>;
    fn request_bot_reply<'a>(
        &'a self,
        chat_id: ChatId,
        content: &'a str,
    ) -> BoxFuture<'a, BackendResult<Message>>;
}
