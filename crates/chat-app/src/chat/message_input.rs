use gpui::prelude::FluentBuilder;
use gpui::*;
use gpui_component::{
    ActiveTheme, Disableable, IconName, Sizable,
    button::{Button, ButtonVariants},
    h_flex,
    input::{Input, InputEvent, InputState},
    label::Label,
    v_flex,
};
use parley_core::composer::{INPUT_PLACEHOLDER, RESEND_LABEL};

use crate::chat::events::{ResendRequested, SendRequested};

pub struct MessageInput {
    input_state: Entity<InputState>,
    has_selection: bool,
    is_busy: bool,
    failure_notice: Option<SharedString>,
    pending_newline: bool,
}

impl EventEmitter<SendRequested> for MessageInput {}
impl EventEmitter<ResendRequested> for MessageInput {}

impl MessageInput {
    pub fn new(window: &mut Window, cx: &mut Context<Self>) -> Self {
        let input_state = cx.new(|cx| {
            InputState::new(window, cx)
                .placeholder(INPUT_PLACEHOLDER)
                .clean_on_escape()
                .auto_grow(1, 6)
        });

        cx.subscribe_in(
            &input_state,
            window,
            |this, _, event: &InputEvent, window, cx| {
                if let InputEvent::PressEnter { secondary } = event {
                    if *secondary {
                        this.pending_newline = false;
                        return;
                    }

                    if this.pending_newline {
                        // Shift+Enter already inserted the newline; swallow its enter event.
                        this.pending_newline = false;
                    } else {
                        this.trim_trailing_newline(window, cx);
                        this.handle_submit(cx);
                    }
                }
            },
        )
        .detach();

        Self {
            input_state,
            has_selection: false,
            is_busy: false,
            failure_notice: None,
            pending_newline: false,
        }
    }

    /// Syncs the control with the selected chat's send state.
    pub fn set_chat_state(
        &mut self,
        has_selection: bool,
        is_busy: bool,
        failure_notice: Option<SharedString>,
        cx: &mut Context<Self>,
    ) {
        self.has_selection = has_selection;
        self.is_busy = is_busy;
        self.failure_notice = failure_notice;
        if is_busy {
            self.pending_newline = false;
        }
        cx.notify();
    }

    pub fn set_text(&mut self, text: String, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            state.set_value(text, window, cx);
        });
        self.pending_newline = false;
    }

    pub fn clear(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.set_text(String::new(), window, cx);
    }

    fn is_disabled(&self) -> bool {
        !self.has_selection || self.is_busy
    }

    fn handle_shift_enter(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        if self.is_disabled() {
            return;
        }

        self.pending_newline = true;
        self.input_state.update(cx, |state, cx| {
            state.insert("\n", window, cx);
        });
        cx.notify();
    }

    fn trim_trailing_newline(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            let value = state.value().to_string();
            if let Some(trimmed) = value.strip_suffix('\n') {
                state.set_value(trimmed.to_string(), window, cx);
            }
        });
    }

    /// The coordinator decides whether the text is accepted and clears the input if so.
    fn handle_submit(&mut self, cx: &mut Context<Self>) {
        if self.is_disabled() {
            return;
        }

        let content = self.input_state.read(cx).value().to_string();
        cx.emit(SendRequested::new(content));
    }
}

impl Render for MessageInput {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let disabled = self.is_disabled();

        v_flex()
            .bg(theme.background)
            .gap_2()
            .p_3()
            .when_some(self.failure_notice.clone().filter(|_| !self.is_busy), |column, notice| {
                column.child(
                    h_flex()
                        .w_full()
                        .items_center()
                        .justify_between()
                        .child(Label::new(notice).text_xs().text_color(theme.danger))
                        .child(
                            Button::new("resend")
                                .ghost()
                                .xsmall()
                                .child(RESEND_LABEL)
                                .on_click(cx.listener(|_, _, _window, cx| {
                                    cx.emit(ResendRequested);
                                })),
                        ),
                )
            })
            .child(
                h_flex()
                    .w_full()
                    .gap_2()
                    .items_end()
                    .child(
                        div()
                            .flex_1()
                            .min_w_0()
                            .px_3()
                            .py_2()
                            .rounded_lg()
                            .border_1()
                            .border_color(theme.border)
                            .bg(theme.background)
                            .on_key_down(cx.listener(|this, event: &KeyDownEvent, window, cx| {
                                if event.keystroke.key == "enter" && event.keystroke.modifiers.shift
                                {
                                    this.handle_shift_enter(window, cx);
                                }
                            }))
                            .child(Input::new(&self.input_state).w_full().disabled(disabled)),
                    )
                    .child(
                        Button::new("send")
                            .small()
                            .primary()
                            .icon(IconName::ArrowUp)
                            .loading(self.is_busy)
                            .disabled(disabled)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.handle_submit(cx);
                            })),
                    ),
            )
    }
}
