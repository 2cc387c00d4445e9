use std::rc::Rc;

use gpui::prelude::FluentBuilder;
use gpui::*;
use gpui_component::{
    ActiveTheme, Disableable, IconName, Sizable, VirtualListScrollHandle,
    button::{Button, ButtonVariants},
    h_flex,
    label::Label,
    list::ListItem,
    v_flex, v_virtual_list,
};
use gpui_tokio_bridge::Tokio;
use parley_backend::{BackendResult, Chat, ChatBackend, ChatId};
use parley_core::chat_list::{self, LIST_ERROR_TEXT, NEW_CHAT_LABEL};
use parley_core::scroll::SIDEBAR_SCROLL_STEP;
use parley_core::{ChatListState, ChatListView, ScrollAffordance, ScrollTolerance};

use crate::chat::events::ChatSelected;
use crate::chat::scroll_manager::{geometry_of, scroll_to};
use crate::services::{Services, join_backend_task};

const CHAT_ROW_HEIGHT: f32 = 40.0;

pub struct ChatSidebar {
    chats: std::sync::Arc<dyn ChatBackend>,
    state: ChatListState,
    item_sizes: Rc<Vec<Size<Pixels>>>,
    scroll_handle: VirtualListScrollHandle,
    fetch_task: Option<Task<()>>,
    create_task: Option<Task<()>>,
}

impl EventEmitter<ChatSelected> for ChatSidebar {}

impl ChatSidebar {
    pub fn new(services: &Services, cx: &mut Context<Self>) -> Self {
        let mut sidebar = Self {
            chats: services.chats.clone(),
            state: ChatListState::new(),
            item_sizes: Rc::new(Vec::new()),
            scroll_handle: VirtualListScrollHandle::new(),
            fetch_task: None,
            create_task: None,
        };
        sidebar.refresh(cx);
        sidebar
    }

    pub fn selected_chat(&self) -> Option<ChatId> {
        self.state.selected()
    }

    pub fn refresh(&mut self, cx: &mut Context<Self>) {
        self.state.begin_fetch();
        let chats = self.chats.clone();
        let task = Tokio::spawn(cx, async move { chat_list::fetch_chats(chats.as_ref()).await });

        self.fetch_task = Some(cx.spawn(async move |this, cx| {
            let Some(result) = join_backend_task(task.await) else {
                return;
            };
            let _ = this.update(cx, |this, cx| {
                this.apply_list(result);
                this.fetch_task = None;
                cx.notify();
            });
        }));
        cx.notify();
    }

    /// Creates a chat and re-reads the list. The selection is left alone.
    pub fn create_chat(&mut self, cx: &mut Context<Self>) {
        if !self.state.begin_create() {
            return;
        }

        let chats = self.chats.clone();
        let task = Tokio::spawn(cx, async move { chat_list::create_chat(chats.as_ref()).await });

        self.create_task = Some(cx.spawn(async move |this, cx| {
            let result = join_backend_task(task.await);
            let _ = this.update(cx, |this, cx| {
                match result {
                    Some(result) => {
                        this.state.finish_create(result);
                        this.rebuild_item_sizes();
                    }
                    None => {
                        let current = this.state.chats().to_vec();
                        this.state.finish_create(Ok(current));
                    }
                }
                this.create_task = None;
                cx.notify();
            });
        }));
        cx.notify();
    }

    pub fn select_chat(&mut self, chat_id: ChatId, cx: &mut Context<Self>) {
        if self.state.select(chat_id) {
            cx.emit(ChatSelected { chat_id });
            cx.notify();
        }
    }

    fn apply_list(&mut self, result: BackendResult<Vec<Chat>>) {
        self.state.apply_fetch(result);
        self.rebuild_item_sizes();
    }

    fn rebuild_item_sizes(&mut self) {
        self.item_sizes = Rc::new(
            self.state
                .chats()
                .iter()
                .map(|_| size(px(0.), px(CHAT_ROW_HEIGHT)))
                .collect(),
        );
    }

    fn scroll_by(&mut self, delta: f32, cx: &mut Context<Self>) {
        let geometry = geometry_of(&self.scroll_handle);
        scroll_to(&self.scroll_handle, geometry.offset_by(delta));
        cx.notify();
    }

    fn render_toolbar(&mut self, cx: &mut Context<Self>) -> impl IntoElement {
        let creating = self.state.is_creating();

        h_flex()
            .w_full()
            .min_w_0()
            .px_3()
            .pt(px(8.))
            .pb_2()
            .child(
                Button::new("new-chat")
                    .small()
                    .primary()
                    .icon(IconName::Plus)
                    .child(NEW_CHAT_LABEL)
                    .disabled(creating)
                    .on_click(cx.listener(|this, _, _window, cx| {
                        this.create_chat(cx);
                    })),
            )
    }

    fn render_status(&self, text: &'static str, is_error: bool, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();
        let color = if is_error {
            theme.danger
        } else {
            theme.foreground.opacity(0.55)
        };

        v_flex()
            .flex_1()
            .items_center()
            .justify_center()
            .px_4()
            .child(Label::new(text).text_sm().text_color(color))
            .into_any_element()
    }

    fn render_chat_list(&mut self, cx: &mut Context<Self>) -> AnyElement {
        match self.state.view() {
            ChatListView::Loading => return self.render_status("Loading chats...", false, cx),
            ChatListView::Failed(_) => return self.render_status(LIST_ERROR_TEXT, true, cx),
            ChatListView::Loaded(chats) if chats.is_empty() => {
                return self.render_status("No chats yet", false, cx);
            }
            ChatListView::Loaded(_) => {}
        }

        let selected = self.state.selected();
        let chats = self.state.chats().to_vec();
        let affordance =
            ScrollAffordance::from_geometry(geometry_of(&self.scroll_handle), ScrollTolerance::SIDEBAR);

        v_flex()
            .flex_1()
            .min_h_0()
            .relative()
            .child(
                v_virtual_list(
                    cx.entity().clone(),
                    "chat-list",
                    self.item_sizes.clone(),
                    move |_this, visible_range, _window, cx| {
                        visible_range
                            .filter_map(|index| {
                                let chat = chats.get(index)?;
                                let chat_id = chat.id;
                                let label = chat_list::chat_label(chat);

                                Some(
                                    div()
                                        .w_full()
                                        .h(px(CHAT_ROW_HEIGHT))
                                        .px_2()
                                        .child(
                                            ListItem::new(("chat", index))
                                                .w_full()
                                                .h_full()
                                                .px_3()
                                                .py_2()
                                                .rounded_md()
                                                .selected(selected == Some(chat_id))
                                                .on_click(cx.listener(
                                                    move |this, _event: &ClickEvent, _window, cx| {
                                                        this.select_chat(chat_id, cx);
                                                    },
                                                ))
                                                .child(
                                                    div()
                                                        .flex_1()
                                                        .min_w_0()
                                                        .truncate()
                                                        .child(Label::new(label).text_sm()),
                                                ),
                                        )
                                        .into_any_element(),
                                )
                            })
                            .collect::<Vec<_>>()
                    },
                )
                .w_full()
                .flex_1()
                .track_scroll(&self.scroll_handle),
            )
            .when(affordance.up, |list| {
                list.child(
                    div().absolute().top_1().right_2().child(
                        Button::new("chat-list-scroll-up")
                            .ghost()
                            .xsmall()
                            .icon(IconName::ChevronUp)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.scroll_by(-SIDEBAR_SCROLL_STEP, cx);
                            })),
                    ),
                )
            })
            .when(affordance.down, |list| {
                list.child(
                    div().absolute().bottom_1().right_2().child(
                        Button::new("chat-list-scroll-down")
                            .ghost()
                            .xsmall()
                            .icon(IconName::ChevronDown)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.scroll_by(SIDEBAR_SCROLL_STEP, cx);
                            })),
                    ),
                )
            })
            .into_any_element()
    }
}

impl Render for ChatSidebar {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        v_flex()
            .size_full()
            .min_w_0()
            .overflow_hidden()
            .bg(theme.background)
            .child(self.render_toolbar(cx))
            .child(self.render_chat_list(cx))
    }
}
