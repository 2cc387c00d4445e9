use chrono::Local;
use parley_backend::{BackendResult, Chat, ChatBackend, ChatId};

pub const NEW_CHAT_LABEL: &str = "New Chat";
pub const LIST_ERROR_TEXT: &str = "Error loading chats.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChatListView {
    #[default]
    Loading,
    Loaded(Vec<Chat>),
    Failed(String),
}

/// Sidebar state: the viewer's chats in server order plus the current selection.
///
/// The selection is not tied to the list contents. Refreshing or creating chats
/// never changes it; only [`ChatListState::select`] does.
#[derive(Debug, Clone, Default)]
pub struct ChatListState {
    view: ChatListView,
    selected: Option<ChatId>,
    creating: bool,
}

impl ChatListState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> &ChatListView {
        &self.view
    }

    pub fn chats(&self) -> &[Chat] {
        match &self.view {
            ChatListView::Loaded(chats) => chats,
            ChatListView::Loading | ChatListView::Failed(_) => &[],
        }
    }

    pub fn selected(&self) -> Option<ChatId> {
        self.selected
    }

    pub fn is_creating(&self) -> bool {
        self.creating
    }

    /// Shows the loader, unless a list is already on screen and only being refreshed.
    pub fn begin_fetch(&mut self) {
        if !matches!(self.view, ChatListView::Loaded(_)) {
            self.view = ChatListView::Loading;
        }
    }

    pub fn apply_fetch(&mut self, result: BackendResult<Vec<Chat>>) {
        self.view = match result {
            Ok(chats) => {
                tracing::debug!(count = chats.len(), "chat list loaded");
                ChatListView::Loaded(chats)
            }
            Err(error) => {
                tracing::warn!(%error, "failed to load chats");
                ChatListView::Failed(LIST_ERROR_TEXT.to_string())
            }
        };
    }

    /// Returns `false` when a creation is already in flight.
    pub fn begin_create(&mut self) -> bool {
        if self.creating {
            return false;
        }
        self.creating = true;
        true
    }

    pub fn finish_create(&mut self, result: BackendResult<Vec<Chat>>) {
        self.creating = false;
        self.apply_fetch(result);
    }

    /// Returns whether the selection changed.
    pub fn select(&mut self, chat_id: ChatId) -> bool {
        if self.selected == Some(chat_id) {
            return false;
        }
        self.selected = Some(chat_id);
        true
    }

    pub fn is_selected(&self, chat_id: ChatId) -> bool {
        self.selected == Some(chat_id)
    }
}

pub async fn fetch_chats(backend: &dyn ChatBackend) -> BackendResult<Vec<Chat>> {
    backend.list_chats().await
}

/// Creates an empty chat, then re-reads the list so the new entry shows in server order.
pub async fn create_chat(backend: &dyn ChatBackend) -> BackendResult<Vec<Chat>> {
    let chat = backend.create_chat().await?;
    tracing::info!(chat_id = %chat.id, "created chat");
    backend.list_chats().await
}

/// Sidebar label for a chat, e.g. `Chat - 2/1/2024`, in the viewer's local time zone.
pub fn chat_label(chat: &Chat) -> String {
    format!(
        "Chat - {}",
        chat.created_at.with_timezone(&Local).format("%-m/%-d/%Y")
    )
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use parley_backend::{AuthProvider, FailurePoint, MemoryBackend};

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

    #[tokio::test]
    async fn create_keeps_selection_and_lists_new_chat_first() {
        let backend = signed_in().await;
        let c1 = ChatId::new_v4();
        let c2 = ChatId::new_v4();
        let base = Utc::now() - Duration::days(2);
        backend.seed_chat(c1, base);
        backend.seed_chat(c2, base + Duration::hours(1));

        let mut state = ChatListState::new();
        state.begin_fetch();
        assert_eq!(state.view(), &ChatListView::Loading);
        state.apply_fetch(fetch_chats(&backend).await);

        let order = state.chats().iter().map(|chat| chat.id).collect::<Vec<_>>();
        assert_eq!(order, vec![c2, c1]);

        assert!(state.select(c1));
        assert!(!state.select(c1));

        assert!(state.begin_create());
        assert!(!state.begin_create());
        state.begin_fetch();
        state.finish_create(create_chat(&backend).await);

        assert!(!state.is_creating());
        assert_eq!(state.selected(), Some(c1));
        let chats = state.chats();
        assert_eq!(chats.len(), 3);
        assert!(chats[0].id != c1 && chats[0].id != c2);
        assert_eq!(chats[1].id, c2);
        assert_eq!(chats[2].id, c1);
    }

    #[tokio::test]
    async fn failed_fetch_shows_inline_error() {
        let backend = signed_in().await;
        backend.fail_next(FailurePoint::ListChats);

        let mut state = ChatListState::new();
        state.apply_fetch(fetch_chats(&backend).await);

        assert_eq!(
            state.view(),
            &ChatListView::Failed(LIST_ERROR_TEXT.to_string())
        );
        assert!(state.chats().is_empty());
    }

    #[tokio::test]
    async fn failed_create_leaves_selection_untouched() {
        let backend = signed_in().await;
        let existing = ChatId::new_v4();
        backend.seed_chat(existing, Utc::now());
        backend.fail_next(FailurePoint::CreateChat);

        let mut state = ChatListState::new();
        state.select(existing);
        state.begin_create();
        state.finish_create(create_chat(&backend).await);

        assert_eq!(state.selected(), Some(existing));
        assert!(!state.is_creating());
        assert!(matches!(state.view(), ChatListView::Failed(_)));
    }

    #[test]
    fn label_uses_month_day_year_without_padding() {
        let created_at = Local
            .with_ymd_and_hms(2024, 2, 1, 12, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc);
        let chat = Chat::new(ChatId::new_v4(), created_at);
        assert_eq!(chat_label(&chat), "Chat - 2/1/2024");
    }
}
