use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::ops::Range;
use std::rc::Rc;

use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{
    ActiveTheme, IconName, Sizable,
    button::{Button, ButtonVariants},
    label::Label,
    text::TextView,
    v_flex, v_virtual_list,
};
use parley_backend::{Message, MessageId, Role};
use parley_core::FeedView;
use parley_core::feed::{EMPTY_FEED_TEXT, FEED_ERROR_TEXT, WELCOME_HINT, WELCOME_TITLE};

use crate::chat::events::RetryFeedRequested;
use crate::chat::scroll_manager::ScrollManager;

const DEFAULT_CONTENT_WIDTH: Pixels = px(680.);
const LIST_HORIZONTAL_PADDING: Pixels = px(16.);
const CONTENT_WIDTH_CHANGE_EPSILON: f32 = 1.0;
const BUBBLE_MAX_WIDTH: Pixels = px(540.);
const BUBBLE_PADDING_X: Pixels = px(14.);
const BUBBLE_PADDING_Y: Pixels = px(10.);
const SPEAKER_LABEL_HEIGHT: Pixels = px(16.);
const SPEAKER_LABEL_GAP: Pixels = px(8.);
const ESTIMATED_TEXT_LINE_HEIGHT: Pixels = px(18.);
const ESTIMATED_CHAR_WIDTH: f32 = 7.0;
const MARKDOWN_SAFE_FALLBACK_THRESHOLD_BYTES: usize = 128 * 1024;

struct SizeCacheEntry {
    layout_hash: u64,
    height: Pixels,
    measured: bool,
}

/// Renders the selected chat's message feed: placeholders, errors or the live list.
pub struct MessageList {
    view: FeedView,
    messages: Vec<Message>,
    item_sizes: Rc<Vec<Size<Pixels>>>,
    scroll_manager: ScrollManager,
    size_cache: HashMap<MessageId, SizeCacheEntry>,
    content_width: Option<Pixels>,
}

impl EventEmitter<RetryFeedRequested> for MessageList {}

impl MessageList {
    pub fn new(_cx: &mut Context<Self>) -> Self {
        Self {
            view: FeedView::Idle,
            messages: Vec::new(),
            item_sizes: Rc::new(Vec::new()),
            scroll_manager: ScrollManager::new(),
            size_cache: HashMap::new(),
            content_width: None,
        }
    }

    /// Shows a new feed state. `switched` marks a different chat, which jumps to its tail.
    pub fn set_view(&mut self, view: FeedView, switched: bool, cx: &mut Context<Self>) {
        let messages = match &view {
            FeedView::Loaded(messages) => messages.clone(),
            FeedView::Idle | FeedView::Loading | FeedView::Failed(_) => Vec::new(),
        };
        let grew = messages.len() > self.messages.len();

        self.view = view;
        self.messages = messages;
        self.rebuild_item_sizes();

        if switched {
            self.scroll_manager.reset();
        } else if grew {
            self.scroll_manager.request_scroll_to_bottom_if_following();
        }

        cx.notify();
    }

    fn update_content_width(&mut self, cx: &mut Context<Self>) {
        let list_width = self.scroll_manager.content_width();
        if list_width <= Pixels::ZERO {
            return;
        }

        let next_content_width = max_pixels(px(1.), list_width - LIST_HORIZONTAL_PADDING * 2);
        let width_changed = self.content_width.is_none_or(|current| {
            (f32::from(current) - f32::from(next_content_width)).abs()
                > CONTENT_WIDTH_CHANGE_EPSILON
        });

        if width_changed {
            self.content_width = Some(next_content_width);
            for entry in self.size_cache.values_mut() {
                entry.measured = false;
            }
            self.rebuild_item_sizes();
            cx.notify();
        }
    }

    fn rebuild_item_sizes(&mut self) {
        let content_width = self.content_width.unwrap_or(DEFAULT_CONTENT_WIDTH);
        let mut active_ids = HashSet::with_capacity(self.messages.len());
        let mut sizes = Vec::with_capacity(self.messages.len());

        for message in &self.messages {
            let next_hash = layout_hash(message);
            let estimated_height = estimate_message_height(message, content_width);

            let entry = self.size_cache.entry(message.id).or_insert(SizeCacheEntry {
                layout_hash: next_hash,
                height: estimated_height,
                measured: false,
            });

            if entry.layout_hash != next_hash {
                entry.layout_hash = next_hash;
                entry.height = estimated_height;
                entry.measured = false;
            } else if !entry.measured {
                entry.height = estimated_height;
            }

            sizes.push(size(px(0.), entry.height));
            active_ids.insert(message.id);
        }

        self.size_cache.retain(|id, _| active_ids.contains(id));
        self.item_sizes = Rc::new(sizes);
    }

    fn measure_visible_items(
        &mut self,
        visible_range: Range<usize>,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        let content_width = self.content_width.unwrap_or(DEFAULT_CONTENT_WIDTH);
        let available_space = size(
            AvailableSpace::Definite(content_width),
            AvailableSpace::MinContent,
        );
        let mut updated = false;

        for index in visible_range {
            let Some(message) = self.messages.get(index).cloned() else {
                continue;
            };

            let mut row = self.render_message_row(&message, index, cx);
            let measured_height = row.layout_as_root(available_space, window, cx).height;
            let Some(entry) = self.size_cache.get_mut(&message.id) else {
                continue;
            };
            if !entry.measured || pixels_changed(entry.height, measured_height) {
                entry.height = measured_height;
                updated = true;
            }
            entry.measured = true;
        }

        if updated {
            let sizes = self
                .messages
                .iter()
                .map(|message| {
                    let height = self
                        .size_cache
                        .get(&message.id)
                        .map(|entry| entry.height)
                        .unwrap_or(ESTIMATED_TEXT_LINE_HEIGHT);
                    size(px(0.), height)
                })
                .collect();
            self.item_sizes = Rc::new(sizes);
            cx.notify();
        }
    }

    fn render_message_row(
        &self,
        message: &Message,
        index: usize,
        cx: &mut Context<Self>,
    ) -> AnyElement {
        let theme = cx.theme();

        if message.role == Role::User {
            return v_flex()
                .w_full()
                .items_end()
                .child(
                    div()
                        .max_w(BUBBLE_MAX_WIDTH)
                        .px(BUBBLE_PADDING_X)
                        .py(BUBBLE_PADDING_Y)
                        .rounded_lg()
                        .bg(theme.primary)
                        .text_color(theme.primary_foreground)
                        .child(Label::new(message.content.clone()).text_sm()),
                )
                .into_any_element();
        }

        v_flex()
            .w_full()
            .items_start()
            .gap_2()
            .child(
                Label::new("Assistant")
                    .text_xs()
                    .text_color(theme.foreground.opacity(0.5)),
            )
            .child(
                div()
                    .max_w(BUBBLE_MAX_WIDTH)
                    .px(BUBBLE_PADDING_X)
                    .py(BUBBLE_PADDING_Y)
                    .rounded_lg()
                    .bg(theme.muted)
                    .text_color(theme.foreground)
                    .child(self.render_assistant_content(message, index)),
            )
            .into_any_element()
    }

    fn render_assistant_content(&self, message: &Message, index: usize) -> AnyElement {
        if message.content.len() > MARKDOWN_SAFE_FALLBACK_THRESHOLD_BYTES {
            return Label::new(message.content.clone())
                .text_sm()
                .into_any_element();
        }

        let markdown_id = ElementId::Name(SharedString::from(format!(
            "assistant-markdown-{}-{index}",
            message.id
        )));

        TextView::markdown(markdown_id, message.content.clone())
            .selectable(true)
            .into_any_element()
    }

    fn render_placeholder(
        &self,
        title: &'static str,
        hint: Option<&'static str>,
        cx: &Context<Self>,
    ) -> AnyElement {
        let theme = cx.theme();

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .gap_2()
            .px_6()
            .child(
                div()
                    .text_lg()
                    .font_weight(FontWeight::SEMIBOLD)
                    .text_color(theme.foreground)
                    .child(title),
            )
            .when_some(hint, |column, hint| {
                column.child(
                    Label::new(hint)
                        .text_sm()
                        .text_color(theme.muted_foreground),
                )
            })
            .into_any_element()
    }

    fn render_failure(&self, cx: &mut Context<Self>) -> AnyElement {
        let theme = cx.theme();

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .gap_3()
            .child(Label::new(FEED_ERROR_TEXT).text_sm().text_color(theme.danger))
            .child(
                Button::new("feed-retry")
                    .small()
                    .primary()
                    .child("Retry")
                    .on_click(cx.listener(|_, _, _window, cx| {
                        cx.emit(RetryFeedRequested);
                    })),
            )
            .into_any_element()
    }

    fn render_feed(&mut self, cx: &mut Context<Self>) -> AnyElement {
        let affordance = self.scroll_manager.affordance();

        div()
            .size_full()
            .relative()
            .child(
                v_virtual_list(
                    cx.entity().clone(),
                    "message-list",
                    self.item_sizes.clone(),
                    |this, visible_range, window, cx| {
                        // Only visible rows are measured.
                        this.update_content_width(cx);
                        this.measure_visible_items(visible_range.clone(), window, cx);
                        visible_range
                            .filter_map(|index| {
                                this.messages
                                    .get(index)
                                    .cloned()
                                    .map(|message| this.render_message_row(&message, index, cx))
                            })
                            .collect::<Vec<_>>()
                    },
                )
                .size_full()
                .px_4()
                .py_3()
                .gap_4()
                .track_scroll(self.scroll_manager.handle()),
            )
            .when(affordance.up, |feed| {
                feed.child(
                    div().absolute().top_2().right_4().child(
                        Button::new("feed-scroll-top")
                            .ghost()
                            .small()
                            .icon(IconName::ArrowUp)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.scroll_manager.scroll_to_top();
                                cx.notify();
                            })),
                    ),
                )
            })
            .when(affordance.down, |feed| {
                feed.child(
                    div().absolute().bottom_2().right_4().child(
                        Button::new("feed-scroll-latest")
                            .ghost()
                            .small()
                            .icon(IconName::ArrowDown)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.scroll_manager.request_scroll_to_bottom();
                                cx.notify();
                            })),
                    ),
                )
            })
            .into_any_element()
    }
}

impl Render for MessageList {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let content = if self.messages.is_empty() {
            match &self.view {
                FeedView::Idle => self.render_placeholder(WELCOME_TITLE, Some(WELCOME_HINT), cx),
                FeedView::Loading => self.render_placeholder("Loading messages...", None, cx),
                FeedView::Failed(_) => self.render_failure(cx),
                FeedView::Loaded(_) => self.render_placeholder(EMPTY_FEED_TEXT, None, cx),
            }
        } else {
            self.update_content_width(cx);
            self.scroll_manager.update_follow_state();
            self.scroll_manager.apply_pending_scroll();
            self.render_feed(cx)
        };

        v_flex().size_full().min_h_0().child(content)
    }
}

fn layout_hash(message: &Message) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(message.id.as_uuid().as_bytes());
    hasher.write(message.role.as_str().as_bytes());
    hasher.write(message.content.as_bytes());
    hasher.finish()
}

fn estimate_message_height(message: &Message, content_width: Pixels) -> Pixels {
    let bubble_width = min_pixels(content_width, BUBBLE_MAX_WIDTH);
    let text_width = max_pixels(px(1.), bubble_width - BUBBLE_PADDING_X * 2);
    let bubble_height = estimate_text_height(&message.content, text_width) + BUBBLE_PADDING_Y * 2;

    match message.role {
        Role::User => bubble_height,
        Role::Assistant => SPEAKER_LABEL_HEIGHT + SPEAKER_LABEL_GAP + bubble_height,
    }
}

fn estimate_text_height(content: &str, width: Pixels) -> Pixels {
    if content.is_empty() {
        return ESTIMATED_TEXT_LINE_HEIGHT;
    }

    let chars_per_line = (f32::from(width) / ESTIMATED_CHAR_WIDTH).floor().max(1.0) as usize;

    let mut line_count = 0usize;
    for line in content.lines() {
        let char_count = line.chars().count().max(1);
        line_count += char_count.div_ceil(chars_per_line);
    }

    if content.ends_with('\n') {
        line_count += 1;
    }

    ESTIMATED_TEXT_LINE_HEIGHT * line_count.max(1)
}

fn max_pixels(a: Pixels, b: Pixels) -> Pixels {
    if f32::from(a) >= f32::from(b) { a } else { b }
}

fn min_pixels(a: Pixels, b: Pixels) -> Pixels {
    if f32::from(a) <= f32::from(b) { a } else { b }
}

fn pixels_changed(a: Pixels, b: Pixels) -> bool {
    (f32::from(a) - f32::from(b)).abs() > 0.5
}
