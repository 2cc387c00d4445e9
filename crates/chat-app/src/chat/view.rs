use std::collections::HashMap;
use std::sync::Arc;

use gpui::*;
use gpui_component::{ActiveTheme, v_flex};
use gpui_tokio_bridge::Tokio;
use parley_backend::{ChatBackend, ChatId, FeedEvent, FeedEvents, SubscriptionWorker};
use parley_core::composer::{self, Outgoing, SendReceipt};
use parley_core::{Composer, FeedSession, FeedTarget, FeedUpdate};

use crate::chat::events::{ChatSelected, ResendRequested, RetryFeedRequested, SendRequested};
use crate::chat::{ChatSidebar, MessageInput, MessageList};
use crate::services::{Services, join_backend_task};

/// Coordinates the sidebar selection, the live feed of the selected chat and the composer.
///
/// The sidebar entity is owned here but laid out by the shell.
pub struct ChatView {
    chats: Arc<dyn ChatBackend>,
    sidebar: Entity<ChatSidebar>,
    message_list: Entity<MessageList>,
    message_input: Entity<MessageInput>,
    feed: FeedSession,
    composer: Composer,
    feed_worker_task: Option<Task<Result<(), gpui_tokio_bridge::JoinError>>>,
    feed_reader_task: Option<Task<()>>,
    send_tasks: HashMap<ChatId, Task<()>>,
    _token_task: Task<()>,
}

impl ChatView {
    pub fn new(services: &Services, window: &mut Window, cx: &mut Context<Self>) -> Self {
        let sidebar = cx.new(|cx| ChatSidebar::new(services, cx));
        let message_list = cx.new(MessageList::new);
        let message_input = cx.new(|cx| MessageInput::new(window, cx));

        cx.subscribe(&sidebar, |this, _, event: &ChatSelected, cx| {
            this.handle_chat_selected(*event, cx);
        })
        .detach();

        cx.subscribe(&message_list, |this, _, _event: &RetryFeedRequested, cx| {
            this.retry_feed(cx);
        })
        .detach();

        cx.subscribe_in(
            &message_input,
            window,
            |this, _, event: &SendRequested, window, cx| {
                this.handle_send(event.clone(), window, cx);
            },
        )
        .detach();

        cx.subscribe_in(
            &message_input,
            window,
            |this, _, _event: &ResendRequested, window, cx| {
                this.handle_resend(window, cx);
            },
        )
        .detach();

        let mut token_rx = services.auth.watch_token_epoch();
        let token_task = cx.spawn(async move |this, cx| {
            while token_rx.changed().await.is_ok() {
                if this.update(cx, |this, cx| this.reconnect_feed(cx)).is_err() {
                    break;
                }
            }
        });

        Self {
            chats: services.chats.clone(),
            sidebar,
            message_list,
            message_input,
            feed: FeedSession::new(services.chats.clone()),
            composer: Composer::new(),
            feed_worker_task: None,
            feed_reader_task: None,
            send_tasks: HashMap::new(),
            _token_task: token_task,
        }
    }

    pub fn sidebar(&self) -> &Entity<ChatSidebar> {
        &self.sidebar
    }

    pub fn create_chat(&mut self, cx: &mut Context<Self>) {
        self.sidebar.update(cx, |sidebar, cx| sidebar.create_chat(cx));
    }

    fn handle_chat_selected(&mut self, event: ChatSelected, cx: &mut Context<Self>) {
        let update = self.feed.select(Some(event.chat_id));
        self.apply_feed_update(update, true, cx);
        self.sync_input(cx);
    }

    fn retry_feed(&mut self, cx: &mut Context<Self>) {
        let update = self.feed.retry();
        self.apply_feed_update(update, false, cx);
    }

    fn reconnect_feed(&mut self, cx: &mut Context<Self>) {
        let update = self.feed.reconnect();
        self.apply_feed_update(update, false, cx);
    }

    fn apply_feed_update(&mut self, update: FeedUpdate, switched: bool, cx: &mut Context<Self>) {
        match update {
            FeedUpdate::Unchanged => return,
            FeedUpdate::Closed => self.stop_feed_tasks(),
            FeedUpdate::Opened(attachment) => {
                self.stop_feed_tasks();
                self.spawn_feed_worker(attachment.worker, cx);
                self.spawn_feed_reader(attachment.target, attachment.events, cx);
            }
        }
        self.push_feed_view(switched, cx);
    }

    fn stop_feed_tasks(&mut self) {
        self.feed_reader_task = None;
        // The session already cancelled the subscription; the worker sends `complete` and exits.
        if let Some(worker) = self.feed_worker_task.take() {
            worker.detach();
        }
    }

    fn spawn_feed_worker(&mut self, worker: SubscriptionWorker, cx: &mut Context<Self>) {
        self.feed_worker_task = Some(Tokio::spawn(cx, worker));
    }

    fn spawn_feed_reader(
        &mut self,
        target: FeedTarget,
        mut events: FeedEvents,
        cx: &mut Context<Self>,
    ) {
        self.feed_reader_task = Some(cx.spawn(async move |this, cx| {
            while let Some(event) = events.recv().await {
                let _ = this.update(cx, |this, cx| {
                    this.handle_feed_event(target, event, cx);
                });
            }
        }));
    }

    fn handle_feed_event(&mut self, target: FeedTarget, event: FeedEvent, cx: &mut Context<Self>) {
        if self.feed.deliver(target, event) {
            self.push_feed_view(false, cx);
        }
    }

    fn push_feed_view(&mut self, switched: bool, cx: &mut Context<Self>) {
        let view = self.feed.view().clone();
        self.message_list.update(cx, |list, cx| {
            list.set_view(view, switched, cx);
        });
        cx.notify();
    }

    fn handle_send(&mut self, event: SendRequested, window: &mut Window, cx: &mut Context<Self>) {
        let selection = self.sidebar.read(cx).selected_chat();
        let Some(outgoing) = self.composer.prepare(&event.content, selection) else {
            return;
        };

        self.message_input.update(cx, |input, cx| input.clear(window, cx));
        self.sync_input(cx);

        let chats = self.chats.clone();
        let request = outgoing.clone();
        let task = Tokio::spawn(cx, async move { composer::send(chats.as_ref(), &request).await });

        let chat_id = outgoing.chat_id;
        let send_task = cx.spawn(async move |this, cx| {
            let result = join_backend_task(task.await);
            let _ = this.update(cx, |this, cx| {
                this.finish_send(&outgoing, result, cx);
            });
        });
        self.send_tasks.insert(chat_id, send_task);
    }

    fn finish_send(
        &mut self,
        outgoing: &Outgoing,
        result: Option<parley_backend::BackendResult<SendReceipt>>,
        cx: &mut Context<Self>,
    ) {
        self.send_tasks.remove(&outgoing.chat_id);
        let result = result.unwrap_or_else(|| {
            Err(parley_backend::BackendError::Protocol {
                stage: "send-message",
                details: "send task was dropped".to_string(),
            })
        });
        self.composer.finish(outgoing, &result);
        self.sync_input(cx);
    }

    fn handle_resend(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        let Some(chat_id) = self.sidebar.read(cx).selected_chat() else {
            return;
        };
        let Some(draft) = self.composer.take_failed_draft(chat_id) else {
            return;
        };

        self.message_input
            .update(cx, |input, cx| input.set_text(draft, window, cx));
        self.sync_input(cx);
    }

    fn sync_input(&mut self, cx: &mut Context<Self>) {
        let selection = self.sidebar.read(cx).selected_chat();
        let is_busy = selection.is_some_and(|chat_id| self.composer.is_busy(chat_id));
        let failure_notice = selection
            .and_then(|chat_id| self.composer.failure_notice(chat_id))
            .map(|notice| SharedString::from(notice.to_string()));

        self.message_input.update(cx, |input, cx| {
            input.set_chat_state(selection.is_some(), is_busy, failure_notice, cx);
        });
        cx.notify();
    }
}

impl Render for ChatView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        v_flex()
            .id("chat-view")
            .size_full()
            .min_w_0()
            .min_h_0()
            .overflow_hidden()
            .bg(theme.background)
            .child(
                div()
                    .id("chat-view-message-list")
                    .flex_1()
                    .min_h_0()
                    .child(self.message_list.clone()),
            )
            .child(
                div()
                    .id("chat-view-message-input")
                    .flex_shrink_0()
                    .w_full()
                    .border_t_1()
                    .border_color(theme.border)
                    .child(self.message_input.clone()),
            )
    }
}
