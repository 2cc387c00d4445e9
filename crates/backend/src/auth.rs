use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use tokio::sync::watch;

use super::endpoints::BackendEndpoints;
use super::error::{
    AuthDecodeSnafu, AuthError, AuthHttpSnafu, AuthResult, NotSignedInSnafu, SessionReplacedSnafu,
};
use super::types::{AuthStatus, Session, SignUpOutcome};
use super::{AuthProvider, BoxFuture};

/// Seconds before access-token expiry at which the refresh runs.
const REFRESH_MARGIN_SECS: u64 = 60;
/// Lower bound so a short-lived token never turns the refresher into a busy loop.
const MIN_REFRESH_DELAY_SECS: u64 = 5;

#[derive(Serialize)]
struct EmailPasswordBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenBody<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct SessionEnvelope {
    #[serde(default)]
    session: Option<Session>,
}

#[derive(Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: String,
}

/// Email/password client for the Nhost auth service.
///
/// The session lives only in memory; a restart always lands on the credential form.
pub struct NhostAuth {
    http: reqwest::Client,
    endpoints: BackendEndpoints,
    session: ArcSwapOption<Session>,
    status: watch::Sender<AuthStatus>,
    token_epoch: watch::Sender<u64>,
}

impl NhostAuth {
    pub fn new(endpoints: BackendEndpoints) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints)
    }

    pub fn with_client(http: reqwest::Client, endpoints: BackendEndpoints) -> Self {
        let (status, _) = watch::channel(AuthStatus::Unauthenticated);
        let (token_epoch, _) = watch::channel(0);
        Self {
            http,
            endpoints,
            session: ArcSwapOption::empty(),
            status,
            token_epoch,
        }
    }

    pub fn endpoints(&self) -> &BackendEndpoints {
        &self.endpoints
    }

    fn store_session(&self, session: &Session) {
        self.session.store(Some(Arc::new(session.clone())));
        self.token_rotated();
    }

    fn clear_session(&self) -> Option<Arc<Session>> {
        let previous = self.session.swap(None);
        self.publish_status();
        previous
    }

    /// Publishes the status implied by the stored session, read under the watch lock.
    fn publish_status(&self) {
        self.status.send_if_modified(|status| {
            let next = if self.session.load().is_some() {
                AuthStatus::Authenticated
            } else {
                AuthStatus::Unauthenticated
            };
            let changed = *status != next;
            *status = next;
            changed
        });
    }

    fn token_rotated(&self) {
        self.publish_status();
        self.token_epoch.send_modify(|epoch| *epoch += 1);
    }

    async fn post<B: Serialize>(
        &self,
        stage: &'static str,
        route: &str,
        body: &B,
    ) -> AuthResult<String> {
        let response = self
            .http
            .post(self.endpoints.auth_route(route))
            .json(body)
            .send()
            .await
            .context(AuthHttpSnafu { stage })?;

        let status = response.status();
        let payload = response.text().await.context(AuthHttpSnafu { stage })?;

        if !status.is_success() {
            return Err(error_from_response(stage, status.as_u16(), &payload));
        }

        Ok(payload)
    }

    async fn sign_up_inner(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        let stage = "sign-up";
        let payload = self
            .post(
                stage,
                "signup/email-password",
                &EmailPasswordBody { email, password },
            )
            .await?;
        let envelope: SessionEnvelope =
            serde_json::from_str(&payload).context(AuthDecodeSnafu { stage })?;

        match envelope.session {
            Some(session) => {
                self.store_session(&session);
                tracing::info!(user_id = %session.user.id, "sign-up returned an active session");
                Ok(SignUpOutcome::Session(session))
            }
            None => {
                tracing::info!("sign-up accepted, email verification pending");
                Ok(SignUpOutcome::VerificationPending)
            }
        }
    }

    async fn sign_in_inner(&self, email: &str, password: &str) -> AuthResult<Session> {
        let stage = "sign-in";
        let payload = self
            .post(
                stage,
                "signin/email-password",
                &EmailPasswordBody { email, password },
            )
            .await?;
        let envelope: SessionEnvelope =
            serde_json::from_str(&payload).context(AuthDecodeSnafu { stage })?;
        let session = envelope.session.context(NotSignedInSnafu { stage })?;

        self.store_session(&session);
        tracing::info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    async fn sign_out_inner(&self) -> AuthResult<()> {
        // Local state goes first so the gate reacts even when the server call fails.
        let Some(previous) = self.clear_session() else {
            return Ok(());
        };

        self.post(
            "sign-out",
            "signout",
            &RefreshTokenBody {
                refresh_token: &previous.refresh_token,
            },
        )
        .await?;
        tracing::info!(user_id = %previous.user.id, "signed out");
        Ok(())
    }

    async fn refresh_inner(&self) -> AuthResult<Session> {
        let stage = "refresh-token";
        let current = self.session.load_full().context(NotSignedInSnafu { stage })?;
        let payload = self
            .post(
                stage,
                "token",
                &RefreshTokenBody {
                    refresh_token: &current.refresh_token,
                },
            )
            .await?;
        let session: Session =
            serde_json::from_str(&payload).context(AuthDecodeSnafu { stage })?;

        // Only replace the session the request was made for; a sign-out or a new
        // sign-in during the round trip wins.
        let expected = Some(current.clone());
        let previous = self
            .session
            .compare_and_swap(&expected, Some(Arc::new(session.clone())));
        if !matches!(&*previous, Some(stored) if Arc::ptr_eq(stored, &current)) {
            tracing::debug!("dropping refreshed token for a session that is gone");
            return SessionReplacedSnafu { stage }.fail();
        }

        self.token_rotated();
        Ok(session)
    }
}

impl AuthProvider for NhostAuth {
    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, AuthResult<SignUpOutcome>> {
        Box::pin(self.sign_up_inner(email, password))
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, AuthResult<Session>> {
        Box::pin(self.sign_in_inner(email, password))
    }

    fn sign_out(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(self.sign_out_inner())
    }

    fn refresh(&self) -> BoxFuture<'_, AuthResult<Session>> {
        Box::pin(self.refresh_inner())
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
        self.session.load_full().map(|session| (*session).clone())
    }
}

/// Maps an auth-service error body onto the error taxonomy shown by the credential form.
pub(crate) fn error_from_response(stage: &'static str, status: u16, body: &str) -> AuthError {
    let Ok(parsed) = serde_json::from_str::<AuthErrorBody>(body) else {
        return AuthError::Rejected {
            stage,
            status,
            message: body.trim().to_string(),
        };
    };

    let message = if parsed.message.trim().is_empty() {
        format!("request rejected with status {status}")
    } else {
        parsed.message
    };

    match parsed.error.as_str() {
        "invalid-email-password" => AuthError::InvalidCredentials { stage, message },
        "unverified-user" => AuthError::Unverified { stage, message },
        _ => AuthError::Rejected {
            stage,
            status,
            message,
        },
    }
}

pub(crate) fn refresh_delay(access_token_expires_in: u64) -> Duration {
    Duration::from_secs(
        access_token_expires_in
            .saturating_sub(REFRESH_MARGIN_SECS)
            .max(MIN_REFRESH_DELAY_SECS),
    )
}

/// Refreshes the access token shortly before it expires for as long as a session exists.
///
/// A failed refresh signs the viewer out, which the session gate observes as a status change.
pub async fn keep_session_fresh(auth: Arc<dyn AuthProvider>) {
    let mut status_rx = auth.watch_status();

    loop {
        let Some(session) = auth.session() else {
            if status_rx.changed().await.is_err() {
                return;
            }
            continue;
        };

        let delay = refresh_delay(session.access_token_expires_in);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                match auth.refresh().await {
                    Ok(_) => tracing::debug!("refreshed access token"),
                    Err(error @ AuthError::SessionReplaced { .. }) => {
                        tracing::debug!(%error, "refresh raced a session change");
                    }
                    Err(error) => {
                        tracing::warn!(%error, "access token refresh failed, signing out");
                        if let Err(error) = auth.sign_out().await {
                            tracing::warn!(%error, "sign-out after failed refresh was rejected");
                        }
                    }
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::routing::post;

    use super::*;
    use crate::ids::UserId;
    use crate::types::User;

    const REFRESHED_SESSION: &str = r#"{
        "accessToken": "access-2",
        "accessTokenExpiresIn": 900,
        "refreshToken": "refresh-2",
        "user": {
            "id": "5b1d7c40-8a4b-4f7e-9b43-3f6a0f1f2a10",
            "email": "ada@example.com",
            "displayName": "ada@example.com",
            "emailVerified": true
        }
    }"#;

    fn stored_session() -> Session {
        Session {
            access_token: "access-1".to_string(),
            access_token_expires_in: 900,
            refresh_token: "refresh-1".to_string(),
            user: User {
                id: UserId::new_v4(),
                email: Some("ada@example.com".to_string()),
                display_name: "ada@example.com".to_string(),
                email_verified: true,
            },
        }
    }

    /// Local auth service answering `/v1/token` after `token_delay` and accepting every sign-out.
    async fn spawn_auth_server(token_delay: Duration) -> String {
        let app = Router::new()
            .route(
                "/v1/token",
                post(move || async move {
                    tokio::time::sleep(token_delay).await;
                    REFRESHED_SESSION
                }),
            )
            .route("/v1/signout", post(|| async { "OK" }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn auth_at(base: String) -> NhostAuth {
        NhostAuth::new(BackendEndpoints::new(base, "http://127.0.0.1:9/v1/graphql"))
    }

    #[tokio::test]
    async fn sign_out_during_refresh_keeps_the_viewer_signed_out() {
        let auth = Arc::new(auth_at(spawn_auth_server(Duration::from_millis(300)).await));
        auth.store_session(&stored_session());
        assert_eq!(auth.status(), AuthStatus::Authenticated);

        let refresh = tokio::spawn({
            let auth = auth.clone();
            async move { auth.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        auth.sign_out().await.unwrap();
        assert_eq!(auth.status(), AuthStatus::Unauthenticated);

        let outcome = refresh.await.unwrap();
        assert!(matches!(outcome, Err(AuthError::SessionReplaced { .. })));
        assert_eq!(auth.status(), AuthStatus::Unauthenticated);
        assert!(auth.session().is_none());
    }

    #[tokio::test]
    async fn refresh_stores_the_new_token_and_bumps_the_epoch() {
        let auth = auth_at(spawn_auth_server(Duration::ZERO).await);
        auth.store_session(&stored_session());
        let epoch_rx = auth.watch_token_epoch();
        assert!(!epoch_rx.has_changed().unwrap());

        let refreshed = auth.refresh().await.unwrap();
        assert_eq!(refreshed.access_token, "access-2");
        assert_eq!(auth.access_token().as_deref(), Some("access-2"));
        assert!(epoch_rx.has_changed().unwrap());
        assert_eq!(auth.status(), AuthStatus::Authenticated);
    }

    #[tokio::test]
    async fn unreachable_service_reports_a_plain_sentence() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let auth = auth_at(format!("http://{addr}/v1"));
        let error = auth
            .sign_in("ada@example.com", "hunter22")
            .await
            .unwrap_err();
        assert!(matches!(error, AuthError::AuthHttp { .. }));
        assert!(error.to_string().contains("`sign-in`"));
        assert_eq!(
            error.user_message(),
            "Could not reach the sign-in service. Check your connection and try again."
        );
    }

    #[test]
    fn wrong_password_maps_to_invalid_credentials() {
        let body = r#"{"status":401,"message":"Incorrect email or password","error":"invalid-email-password"}"#;
        let error = error_from_response("sign-in", 401, body);
        assert!(matches!(error, AuthError::InvalidCredentials { .. }));
        assert_eq!(error.user_message(), "Incorrect email or password");
    }

    #[test]
    fn unverified_account_is_reported_separately() {
        let body = r#"{"status":401,"message":"Email is not verified","error":"unverified-user"}"#;
        assert!(matches!(
            error_from_response("sign-in", 401, body),
            AuthError::Unverified { .. }
        ));
    }

    #[test]
    fn non_json_error_body_is_kept_verbatim() {
        let error = error_from_response("sign-up", 502, "Bad Gateway\n");
        assert!(matches!(error, AuthError::Rejected { status: 502, .. }));
        assert_eq!(error.user_message(), "Bad Gateway");
    }

    #[test]
    fn refresh_runs_a_minute_before_expiry_with_a_floor() {
        assert_eq!(refresh_delay(900), Duration::from_secs(840));
        assert_eq!(refresh_delay(30), Duration::from_secs(MIN_REFRESH_DELAY_SECS));
    }

    #[test]
    fn session_envelope_accepts_null_session() {
        let envelope: SessionEnvelope = serde_json::from_str(r#"{"session":null}"#).unwrap();
        assert!(envelope.session.is_none());
    }

    #[test]
    fn session_decodes_nhost_payload_and_hides_tokens_in_debug() {
        let payload = r#"{
            "session": {
                "accessToken": "secret-access",
                "accessTokenExpiresIn": 900,
                "refreshToken": "secret-refresh",
                "refreshTokenId": "0d3c2c5e-0000-4000-8000-000000000000",
                "user": {
                    "id": "5b1d7c40-8a4b-4f7e-9b43-3f6a0f1f2a10",
                    "email": "ada@example.com",
                    "displayName": "ada@example.com",
                    "emailVerified": true,
                    "roles": ["user"]
                }
            },
            "mfa": null
        }"#;
        let envelope: SessionEnvelope = serde_json::from_str(payload).unwrap();
        let session = envelope.session.unwrap();
        assert_eq!(session.access_token_expires_in, 900);
        assert!(session.user.email_verified);
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
