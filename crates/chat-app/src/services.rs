use std::sync::Arc;

use parley_backend::{AuthProvider, ChatBackend, HasuraClient, MemoryBackend, NhostAuth};

use crate::settings::{ClientSettings, SettingsError};

/// Collaborators shared by every view. Handed down explicitly, never stored globally.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthProvider>,
    pub chats: Arc<dyn ChatBackend>,
    pub offline: bool,
}

impl Services {
    /// Hosted project described by `settings`.
    pub fn connect(settings: &ClientSettings) -> Result<Self, SettingsError> {
        let endpoints = settings.endpoints()?;
        tracing::info!(
            auth_url = %endpoints.auth_url,
            graphql_url = %endpoints.graphql_url,
            "using hosted backend"
        );

        let http = reqwest::Client::new();
        let auth: Arc<dyn AuthProvider> =
            Arc::new(NhostAuth::with_client(http.clone(), endpoints.clone()));
        let chats = Arc::new(HasuraClient::with_client(http, endpoints, auth.clone()));

        Ok(Self {
            auth,
            chats,
            offline: false,
        })
    }

    /// In-process backend that accepts any new account right away.
    pub fn offline() -> Self {
        tracing::info!("using in-memory backend");
        let backend = MemoryBackend::without_verification().shared();
        Self {
            auth: backend.clone(),
            chats: backend,
            offline: true,
        }
    }
}

/// Unwraps a bridged Tokio task, logging when the task itself did not complete.
pub(crate) fn join_backend_task<T, E: std::fmt::Debug>(joined: Result<T, E>) -> Option<T> {
    match joined {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::error!(?error, "backend task did not complete");
            None
        }
    }
}
