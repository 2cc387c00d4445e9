use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ChatId, MessageId, UserId};

/// Author of a message as stored in the `messages.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(id: ChatId, created_at: DateTime<Utc>) -> Self {
        Self { id, created_at }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email_verified: bool,
}

/// Tokens issued by the auth service after a successful sign-in.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub access_token_expires_in: u64,
    pub refresh_token: String,
    pub user: User,
}

// Tokens never reach log output.
impl std::fmt::Debug for Session {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Session")
            .field("access_token_expires_in", &self.access_token_expires_in)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Result of a sign-up call. Projects that require email verification return no session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    Session(Session),
    VerificationPending,
}

/// Observable authentication state owned by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthStatus {
    #[default]
    Loading,
    Unauthenticated,
    Authenticated,
}
