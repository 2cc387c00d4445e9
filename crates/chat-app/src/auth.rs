use std::sync::Arc;

use gpui::prelude::FluentBuilder;
use gpui::*;
use gpui_component::{
    ActiveTheme, Disableable, Sizable,
    button::{Button, ButtonVariants},
    h_flex,
    input::{Input, InputEvent, InputState},
    label::Label,
    v_flex,
};
use gpui_tokio_bridge::Tokio;
use parley_backend::{AuthError, AuthProvider, Session, SignUpOutcome};
use parley_core::credentials::{
    ERROR_TITLE, VERIFICATION_HINT, VERIFICATION_NOTICE, VERIFICATION_TITLE,
};
use parley_core::{CredentialForm, FormMode, SubmitRequest};

use crate::services::join_backend_task;

enum SubmitOutcome {
    SignIn(Result<Session, AuthError>),
    SignUp(Result<SignUpOutcome, AuthError>),
}

/// Email/password screen shown while nobody is signed in.
pub struct AuthPage {
    auth: Arc<dyn AuthProvider>,
    form: CredentialForm,
    email_input: Entity<InputState>,
    password_input: Entity<InputState>,
    submit_task: Option<Task<()>>,
}

impl AuthPage {
    pub fn new(auth: Arc<dyn AuthProvider>, window: &mut Window, cx: &mut Context<Self>) -> Self {
        let email_input = cx.new(|cx| InputState::new(window, cx).placeholder("Email"));
        let password_input = cx.new(|cx| {
            InputState::new(window, cx)
                .placeholder("Password")
                .masked(true)
        });

        for input in [&email_input, &password_input] {
            cx.subscribe_in(input, window, |this, _, event: &InputEvent, window, cx| {
                if let InputEvent::PressEnter { .. } = event {
                    this.submit(window, cx);
                }
            })
            .detach();
        }

        Self {
            auth,
            form: CredentialForm::new(),
            email_input,
            password_input,
            submit_task: None,
        }
    }

    fn submit(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        let email = self.email_input.read(cx).value().to_string();
        let password = self.password_input.read(cx).value().to_string();
        self.form.set_email(email);
        self.form.set_password(password);

        let Some(request) = self.form.begin_submit() else {
            return;
        };
        tracing::debug!(?request, "submitting credentials");

        let mode = request.mode;
        let auth = self.auth.clone();
        let task = Tokio::spawn(cx, async move { run_submit(auth.as_ref(), request).await });

        self.submit_task = Some(cx.spawn_in(window, async move |this, cx| {
            let outcome = join_backend_task(task.await);
            let _ = this.update_in(cx, |this, window, cx| {
                this.finish_submit(mode, outcome, window, cx);
            });
        }));
        cx.notify();
    }

    fn finish_submit(
        &mut self,
        mode: FormMode,
        outcome: Option<SubmitOutcome>,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        self.submit_task = None;
        match outcome {
            Some(SubmitOutcome::SignIn(result)) => self.form.finish_sign_in(result.as_ref()),
            Some(SubmitOutcome::SignUp(result)) => {
                self.form.finish_sign_up(result.as_ref());
                if self.form.mode() == FormMode::VerificationPending {
                    self.clear_inputs(window, cx);
                }
            }
            None => {
                let error = AuthError::Interrupted {
                    stage: "submit-credentials",
                };
                self.form.fail_submit(mode, &error);
            }
        }
        cx.notify();
    }

    fn clear_inputs(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        for input in [&self.email_input, &self.password_input] {
            input.update(cx, |state, cx| state.set_value("", window, cx));
        }
    }

    fn toggle_mode(&mut self, cx: &mut Context<Self>) {
        self.form.toggle_mode();
        cx.notify();
    }

    fn back_to_sign_in(&mut self, cx: &mut Context<Self>) {
        self.form.back_to_sign_in();
        cx.notify();
    }

    fn render_error(&self, message: String, cx: &Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        v_flex()
            .id("auth-error")
            .w_full()
            .gap_1()
            .p_3()
            .rounded_md()
            .border_1()
            .border_color(theme.danger)
            .child(
                Label::new(ERROR_TITLE)
                    .text_sm()
                    .font_weight(FontWeight::SEMIBOLD)
                    .text_color(theme.danger),
            )
            .child(Label::new(message).text_sm().text_color(theme.danger))
    }

    fn render_verification(&self, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();

        v_flex()
            .id("auth-verification")
            .w_full()
            .gap_3()
            .child(
                div()
                    .text_lg()
                    .font_weight(FontWeight::SEMIBOLD)
                    .text_color(theme.foreground)
                    .child(VERIFICATION_TITLE),
            )
            .child(Label::new(VERIFICATION_NOTICE).text_sm())
            .child(
                Label::new(VERIFICATION_HINT)
                    .text_xs()
                    .text_color(theme.muted_foreground),
            )
            .child(
                Button::new("auth-back-to-sign-in")
                    .small()
                    .primary()
                    .child("Back to Sign In")
                    .on_click(cx.listener(|this, _, _window, cx| {
                        this.back_to_sign_in(cx);
                    })),
            )
            .into_any_element()
    }

    fn render_form(&self, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();
        let busy = self.form.is_busy();
        let (prompt, action) = self.form.toggle_labels();

        v_flex()
            .id("auth-form")
            .w_full()
            .gap_3()
            .child(
                div()
                    .text_lg()
                    .font_weight(FontWeight::SEMIBOLD)
                    .text_color(theme.foreground)
                    .child(self.form.title()),
            )
            .when_some(self.form.error(), |form, message| {
                form.child(self.render_error(message.to_string(), cx))
            })
            .child(
                v_flex()
                    .gap_1()
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.foreground)
                            .child("Email"),
                    )
                    .child(Input::new(&self.email_input).w_full().disabled(busy)),
            )
            .child(
                v_flex()
                    .gap_1()
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.foreground)
                            .child("Password"),
                    )
                    .child(Input::new(&self.password_input).w_full().disabled(busy)),
            )
            .child(
                Button::new("auth-submit")
                    .primary()
                    .child(self.form.submit_label())
                    .loading(busy)
                    .disabled(busy)
                    .on_click(cx.listener(|this, _, window, cx| {
                        this.submit(window, cx);
                    })),
            )
            .child(
                h_flex()
                    .gap_1()
                    .items_center()
                    .justify_center()
                    .child(
                        Label::new(prompt)
                            .text_sm()
                            .text_color(theme.muted_foreground),
                    )
                    .child(
                        Button::new("auth-toggle-mode")
                            .ghost()
                            .xsmall()
                            .child(action)
                            .disabled(busy)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.toggle_mode(cx);
                            })),
                    ),
            )
            .into_any_element()
    }
}

impl Render for AuthPage {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let content = match self.form.mode() {
            FormMode::VerificationPending => self.render_verification(cx),
            FormMode::SignIn | FormMode::SignUp => self.render_form(cx),
        };

        v_flex()
            .id("auth-page")
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(
                div()
                    .w(px(380.))
                    .p_6()
                    .rounded_lg()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.popover)
                    .shadow_lg()
                    .child(content),
            )
    }
}

async fn run_submit(auth: &dyn AuthProvider, request: SubmitRequest) -> SubmitOutcome {
    match request.mode {
        FormMode::SignUp => {
            SubmitOutcome::SignUp(auth.sign_up(&request.email, &request.password).await)
        }
        FormMode::SignIn | FormMode::VerificationPending => {
            SubmitOutcome::SignIn(auth.sign_in(&request.email, &request.password).await)
        }
    }
}
