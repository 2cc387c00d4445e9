use std::path::PathBuf;

use gpui::prelude::FluentBuilder;
use gpui::*;
use gpui_component::{
    ActiveTheme, Sizable,
    button::{Button, ButtonVariants},
    h_flex,
    label::Label,
    v_flex,
};
use gpui_tokio_bridge::Tokio;
use parley_backend::keep_session_fresh;
use parley_core::GateOutcome;

use crate::auth::AuthPage;
use crate::chat::ChatView;
use crate::services::{Services, join_backend_task};

pub const APP_TITLE: &str = "AI Chatbot";

/// Returns the default themes directory path.
pub fn default_themes_path() -> PathBuf {
    PathBuf::from("./themes")
}

pub const SIDEBAR_WIDTH: f32 = 260.0;
#[cfg(target_os = "macos")]
const WINDOW_TOOLBAR_LEFT_SAFE_PADDING: f32 = 78.0;
#[cfg(not(target_os = "macos"))]
const WINDOW_TOOLBAR_LEFT_SAFE_PADDING: f32 = 16.0;

fn window_toolbar_height(window: &Window) -> Pixels {
    (1.75 * window.rem_size()).max(px(34.0))
}

gpui::actions!(shell, [NewChat, SignOut, Quit]);

/// Root view. Shows the credential screen or the chat workspace depending on the
/// current auth status, re-evaluated on every render.
pub struct ParleyShell {
    services: Services,
    auth_page: Option<Entity<AuthPage>>,
    chat_view: Option<Entity<ChatView>>,
    title_bar_should_move: bool,
    _status_task: Task<()>,
    _refresh_task: Task<Result<(), gpui_tokio_bridge::JoinError>>,
    sign_out_task: Option<Task<()>>,
}

impl ParleyShell {
    pub fn new(services: Services, _window: &mut Window, cx: &mut Context<Self>) -> Self {
        let mut status_rx = services.auth.watch_status();
        let status_task = cx.spawn(async move |this, cx| {
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                tracing::info!(?status, "auth status changed");
                if this.update(cx, |_, cx| cx.notify()).is_err() {
                    break;
                }
            }
        });

        let refresh_task = Tokio::spawn(cx, keep_session_fresh(services.auth.clone()));

        Self {
            services,
            auth_page: None,
            chat_view: None,
            title_bar_should_move: false,
            _status_task: status_task,
            _refresh_task: refresh_task,
            sign_out_task: None,
        }
    }

    fn new_chat(&mut self, cx: &mut Context<Self>) {
        if let Some(chat_view) = &self.chat_view {
            chat_view.update(cx, |chat_view, cx| chat_view.create_chat(cx));
        }
    }

    fn sign_out(&mut self, cx: &mut Context<Self>) {
        if self.sign_out_task.is_some() {
            return;
        }

        let auth = self.services.auth.clone();
        let task = Tokio::spawn(cx, async move { auth.sign_out().await });
        self.sign_out_task = Some(cx.spawn(async move |this, cx| {
            if let Some(Err(error)) = join_backend_task(task.await) {
                tracing::warn!(%error, "sign-out failed");
            }
            let _ = this.update(cx, |this, cx| {
                this.sign_out_task = None;
                cx.notify();
            });
        }));
        cx.notify();
    }

    /// Builds the page for the current gate outcome, dropping the other one so
    /// nothing from a previous session outlives it.
    fn sync_gate(&mut self, window: &mut Window, cx: &mut Context<Self>) -> GateOutcome {
        let outcome = GateOutcome::for_status(self.services.auth.status());
        match outcome {
            GateOutcome::Wait => {}
            GateOutcome::RedirectToCredentials => {
                self.chat_view = None;
                if self.auth_page.is_none() {
                    let auth = self.services.auth.clone();
                    self.auth_page = Some(cx.new(|cx| AuthPage::new(auth, window, cx)));
                }
            }
            GateOutcome::RenderProtected => {
                self.auth_page = None;
                if self.chat_view.is_none() {
                    let services = self.services.clone();
                    self.chat_view = Some(cx.new(|cx| ChatView::new(&services, window, cx)));
                }
            }
        }
        outcome
    }

    fn render_loader(&self, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();

        v_flex()
            .id("gate-loading")
            .size_full()
            .items_center()
            .justify_center()
            .child(
                Label::new("Loading...")
                    .text_sm()
                    .text_color(theme.muted_foreground),
            )
            .into_any_element()
    }

    fn render_top_bar(
        &self,
        window: &Window,
        toolbar_height: Pixels,
        signed_in: bool,
        cx: &Context<Self>,
    ) -> impl IntoElement {
        let theme = cx.theme();
        let signing_out = self.sign_out_task.is_some();

        h_flex()
            .id("app-top-bar")
            .window_control_area(WindowControlArea::Drag)
            .on_mouse_down_out(cx.listener(|this, _, _window, _cx| {
                this.title_bar_should_move = false;
            }))
            .on_mouse_up(
                MouseButton::Left,
                cx.listener(|this, _, _window, _cx| {
                    this.title_bar_should_move = false;
                }),
            )
            .on_mouse_down(
                MouseButton::Left,
                cx.listener(|this, _, _window, _cx| {
                    this.title_bar_should_move = true;
                }),
            )
            .on_mouse_move(cx.listener(|this, _, window, _cx| {
                if this.title_bar_should_move {
                    this.title_bar_should_move = false;
                    window.start_window_move();
                }
            }))
            .w_full()
            .h(toolbar_height)
            .flex_shrink_0()
            .pl(px(WINDOW_TOOLBAR_LEFT_SAFE_PADDING))
            .pr_4()
            .items_center()
            .justify_between()
            .bg(theme.background)
            .border_b_1()
            .border_color(theme.border)
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .text_sm()
                            .font_weight(FontWeight::SEMIBOLD)
                            .text_color(theme.foreground)
                            .child(APP_TITLE),
                    )
                    .when(self.services.offline, |title| {
                        title.child(
                            div()
                                .id("app-offline-badge")
                                .px_2()
                                .py_1()
                                .rounded_full()
                                .bg(theme.muted)
                                .border_1()
                                .border_color(theme.border)
                                .text_xs()
                                .text_color(theme.muted_foreground)
                                .child("offline"),
                        )
                    }),
            )
            .when(signed_in, |bar| {
                bar.child(
                    Button::new("sign-out")
                        .ghost()
                        .small()
                        .child("Sign Out")
                        .loading(signing_out)
                        .on_mouse_down(MouseButton::Left, |_, _, cx| cx.stop_propagation())
                        .on_click(cx.listener(|this, _, _window, cx| {
                            this.sign_out(cx);
                        })),
                )
            })
            .when(
                cfg!(target_os = "linux") && window.window_controls().window_menu,
                |title_bar| {
                    title_bar.on_mouse_down(MouseButton::Right, |event, window, _| {
                        window.show_window_menu(event.position);
                    })
                },
            )
    }

    fn render_workspace(&self, chat_view: Entity<ChatView>, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();
        let sidebar = chat_view.read(cx).sidebar().clone();

        h_flex()
            .id("app-shell-body")
            .size_full()
            .min_w_0()
            .min_h_0()
            .overflow_hidden()
            .child(
                div()
                    .id("sidebar-container")
                    .h_full()
                    .w(px(SIDEBAR_WIDTH))
                    .flex_shrink_0()
                    .overflow_hidden()
                    .border_r_1()
                    .border_color(theme.border)
                    .child(sidebar),
            )
            .child(
                v_flex()
                    .id("main-content")
                    .flex_1()
                    .h_full()
                    .min_w_0()
                    .min_h_0()
                    .overflow_hidden()
                    .child(chat_view),
            )
            .into_any_element()
    }
}

impl Render for ParleyShell {
    fn render(&mut self, window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let outcome = self.sync_gate(window, cx);
        let toolbar_height = window_toolbar_height(window);

        let body = match (outcome, &self.auth_page, &self.chat_view) {
            (GateOutcome::RenderProtected, _, Some(chat_view)) => {
                self.render_workspace(chat_view.clone(), cx)
            }
            (GateOutcome::RedirectToCredentials, Some(auth_page), _) => {
                auth_page.clone().into_any_element()
            }
            _ => self.render_loader(cx),
        };
        let signed_in = outcome == GateOutcome::RenderProtected;
        let theme = cx.theme();

        div()
            .size_full()
            .relative()
            .bg(theme.background)
            .on_action(cx.listener(|this, _: &NewChat, _window, cx| this.new_chat(cx)))
            .on_action(cx.listener(|this, _: &SignOut, _window, cx| this.sign_out(cx)))
            .child(
                v_flex()
                    .size_full()
                    .pt(toolbar_height)
                    .child(div().flex_1().min_h_0().child(body)),
            )
            .child(
                div()
                    .absolute()
                    .top_0()
                    .left_0()
                    .right_0()
                    .child(self.render_top_bar(window, toolbar_height, signed_in, cx)),
            )
    }
}
