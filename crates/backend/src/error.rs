use snafu::Snafu;

/// Failures reported by the authentication service.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    #[snafu(display("{message}"))]
    InvalidCredentials {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("{message}"))]
    Unverified {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("{message}"))]
    Rejected {
        stage: &'static str,
        status: u16,
        message: String,
    },
    #[snafu(display("auth request failed on `{stage}`: {source}"))]
    AuthHttp {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to decode auth response on `{stage}`: {source}"))]
    AuthDecode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("no active session on `{stage}`"))]
    NotSignedIn { stage: &'static str },
    #[snafu(display("session changed while `{stage}` was in flight"))]
    SessionReplaced { stage: &'static str },
    #[snafu(display("request on `{stage}` was interrupted"))]
    Interrupted { stage: &'static str },
}

impl AuthError {
    /// Text shown inline on the credential form. Transport details stay in `Display` for logs.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::AuthHttp { .. } => {
                "Could not reach the sign-in service. Check your connection and try again."
                    .to_string()
            }
            AuthError::AuthDecode { .. } => {
                "The sign-in service sent an unexpected response. Please try again.".to_string()
            }
            AuthError::NotSignedIn { .. } | AuthError::SessionReplaced { .. } => {
                "Your session ended. Please sign in again.".to_string()
            }
            AuthError::Interrupted { .. } => {
                "The request was interrupted. Please try again.".to_string()
            }
            AuthError::InvalidCredentials { .. }
            | AuthError::Unverified { .. }
            | AuthError::Rejected { .. } => self.to_string(),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Failures reported by the GraphQL API or the live message feed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("graphql request failed on `{stage}`: {source}"))]
    Http {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("graphql endpoint returned status {status} on `{stage}`: {body}"))]
    Status {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("graphql errors on `{stage}`: {}", messages.join("; ")))]
    GraphQl {
        stage: &'static str,
        messages: Vec<String>,
    },
    #[snafu(display("failed to decode graphql payload on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("graphql response on `{stage}` has no `{field}` data"))]
    MissingData {
        stage: &'static str,
        field: &'static str,
    },
    #[snafu(display("websocket failure on `{stage}`: {source}"))]
    WebSocket {
        stage: &'static str,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("subscription protocol violation on `{stage}`: {details}"))]
    Protocol {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("request on `{stage}` requires a signed-in session"))]
    NotAuthenticated { stage: &'static str },
    #[snafu(display("id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: uuid::Error,
    },
    #[snafu(display("chat '{chat_id}' does not exist"))]
    UnknownChat {
        stage: &'static str,
        chat_id: String,
    },
}

pub type BackendResult<T> = Result<T, BackendError>;
