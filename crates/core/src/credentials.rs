use parley_backend::{AuthError, Session, SignUpOutcome};

pub const SIGN_IN_TITLE: &str = "Welcome !!";
pub const SIGN_UP_TITLE: &str = "Create an Account";
pub const ERROR_TITLE: &str = "Incorrect Credentials!";
pub const VERIFICATION_TITLE: &str = "Account Created Successfully!";
pub const VERIFICATION_NOTICE: &str =
    "Verification link sent to your email. Please check your inbox or spam folder.";
pub const VERIFICATION_HINT: &str = "Click the verification link in your email to activate your account, then return here to sign in.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FormMode {
    #[default]
    SignIn,
    SignUp,
    VerificationPending,
}

/// Credentials captured for one submission.
#[derive(Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub mode: FormMode,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for SubmitRequest {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SubmitRequest")
            .field("mode", &self.mode)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// State of the email/password form.
///
/// Successful sign-in never navigates from here: the session gate observes the new
/// auth status and swaps the screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialForm {
    mode: FormMode,
    email: String,
    password: String,
    error: Option<String>,
    busy: bool,
}

impl CredentialForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn title(&self) -> &'static str {
        match self.mode {
            FormMode::SignUp => SIGN_UP_TITLE,
            FormMode::SignIn | FormMode::VerificationPending => SIGN_IN_TITLE,
        }
    }

    pub fn submit_label(&self) -> &'static str {
        match self.mode {
            FormMode::SignUp => "Sign Up",
            FormMode::SignIn | FormMode::VerificationPending => "Sign In",
        }
    }

    /// Prompt and link text under the form.
    pub fn toggle_labels(&self) -> (&'static str, &'static str) {
        match self.mode {
            FormMode::SignUp => ("Already have an account? ", "Sign In"),
            FormMode::SignIn | FormMode::VerificationPending => {
                ("Don't have an account? ", "Sign Up")
            }
        }
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    /// Captures the credentials to send, or `None` when nothing may be submitted.
    pub fn begin_submit(&mut self) -> Option<SubmitRequest> {
        if self.busy || self.mode == FormMode::VerificationPending {
            return None;
        }

        self.error = None;
        self.busy = true;
        Some(SubmitRequest {
            mode: self.mode,
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }

    pub fn finish_sign_in(&mut self, result: Result<&Session, &AuthError>) {
        self.busy = false;
        if let Err(error) = result {
            tracing::warn!(%error, "sign-in failed");
            self.error = Some(error.user_message());
        }
    }

    pub fn finish_sign_up(&mut self, result: Result<&SignUpOutcome, &AuthError>) {
        self.busy = false;
        match result {
            Ok(_) => {
                self.mode = FormMode::VerificationPending;
                self.email.clear();
                self.password.clear();
                self.error = None;
            }
            Err(error) => {
                tracing::warn!(%error, "sign-up failed");
                self.error = Some(error.user_message());
            }
        }
    }

    /// Switches between sign-in and sign-up, dropping any error or verification notice.
    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            FormMode::SignIn => FormMode::SignUp,
            FormMode::SignUp | FormMode::VerificationPending => FormMode::SignIn,
        };
        self.error = None;
    }

    pub fn back_to_sign_in(&mut self) {
        self.mode = FormMode::SignIn;
        self.error = None;
    }

    /// Ends a submission whose request never came back, reported through the
    /// handler of the mode it was sent in.
    pub fn fail_submit(&mut self, mode: FormMode, error: &AuthError) {
        match mode {
            FormMode::SignUp => self.finish_sign_up(Err(error)),
            FormMode::SignIn | FormMode::VerificationPending => self.finish_sign_in(Err(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_backend::{AuthProvider, AuthStatus, MemoryBackend};

    use super::*;
    use crate::gate::GateOutcome;

    fn filled(mode: FormMode) -> CredentialForm {
        let mut form = CredentialForm::new();
        if mode == FormMode::SignUp {
            form.toggle_mode();
        }
        form.set_email("  ada@example.com ");
        form.set_password("hunter22");
        form
    }

    #[test]
    fn starts_in_sign_in_mode() {
        let form = CredentialForm::new();
        assert_eq!(form.mode(), FormMode::SignIn);
        assert_eq!(form.title(), SIGN_IN_TITLE);
        assert_eq!(form.submit_label(), "Sign In");
    }

    #[tokio::test]
    async fn sign_up_moves_to_verification_and_clears_fields() {
        let backend = MemoryBackend::new();
        let mut form = filled(FormMode::SignUp);

        let request = form.begin_submit().unwrap();
        assert_eq!(request.mode, FormMode::SignUp);
        assert_eq!(request.email, "ada@example.com");
        assert!(form.is_busy());

        let result = backend.sign_up(&request.email, &request.password).await;
        form.finish_sign_up(result.as_ref());

        assert_eq!(form.mode(), FormMode::VerificationPending);
        assert_eq!(form.email(), "");
        assert_eq!(form.password(), "");
        assert!(!form.is_busy());
        assert_eq!(backend.status(), AuthStatus::Unauthenticated);
        assert!(form.begin_submit().is_none());
    }

    #[tokio::test]
    async fn sign_in_reaches_protected_view_through_status_only() {
        let backend = Arc::new(MemoryBackend::new());
        backend.register_verified_user("ada@example.com", "hunter22");
        let mut status_rx = backend.watch_status();
        let mut form = filled(FormMode::SignIn);

        let request = form.begin_submit().unwrap();
        let result = backend.sign_in(&request.email, &request.password).await;
        form.finish_sign_in(result.as_ref());

        // The form itself stays put; the gate flips because the status changed.
        assert_eq!(form.mode(), FormMode::SignIn);
        assert!(form.error().is_none());
        assert!(status_rx.has_changed().unwrap());
        let status = *status_rx.borrow_and_update();
        assert_eq!(GateOutcome::for_status(status), GateOutcome::RenderProtected);
    }

    #[test]
    fn interrupted_sign_up_stays_in_sign_up_with_an_error() {
        let mut form = filled(FormMode::SignUp);
        let request = form.begin_submit().unwrap();

        let error = AuthError::Interrupted {
            stage: "submit-credentials",
        };
        form.fail_submit(request.mode, &error);

        assert_eq!(form.mode(), FormMode::SignUp);
        assert!(!form.is_busy());
        assert_eq!(
            form.error(),
            Some("The request was interrupted. Please try again.")
        );
        assert_eq!(form.password(), "hunter22");
    }

    #[tokio::test]
    async fn failed_sign_in_shows_error_and_keeps_inputs() {
        let backend = MemoryBackend::new();
        let mut form = filled(FormMode::SignIn);

        let request = form.begin_submit().unwrap();
        let result = backend.sign_in(&request.email, &request.password).await;
        form.finish_sign_in(result.as_ref());

        assert_eq!(form.error(), Some("Incorrect email or password"));
        assert_eq!(form.email(), "  ada@example.com ");
        assert_eq!(form.password(), "hunter22");
        assert_eq!(backend.status(), AuthStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn failed_sign_up_keeps_form_in_sign_up() {
        let backend = MemoryBackend::new();
        backend.register_verified_user("ada@example.com", "other");
        let mut form = filled(FormMode::SignUp);

        let request = form.begin_submit().unwrap();
        let result = backend.sign_up(&request.email, &request.password).await;
        form.finish_sign_up(result.as_ref());

        assert_eq!(form.mode(), FormMode::SignUp);
        assert_eq!(form.error(), Some("Email already in use"));
        assert_eq!(form.password(), "hunter22");
    }

    #[test]
    fn toggle_clears_error_and_verification_notice() {
        let mut form = CredentialForm::new();
        form.error = Some("boom".to_string());
        form.toggle_mode();
        assert_eq!(form.mode(), FormMode::SignUp);
        assert!(form.error().is_none());
        assert_eq!(form.toggle_labels().1, "Sign In");

        form.mode = FormMode::VerificationPending;
        form.toggle_mode();
        assert_eq!(form.mode(), FormMode::SignIn);
    }

    #[test]
    fn back_control_forces_sign_in() {
        let mut form = CredentialForm::new();
        form.mode = FormMode::VerificationPending;
        form.back_to_sign_in();
        assert_eq!(form.mode(), FormMode::SignIn);
    }

    #[test]
    fn double_submit_is_ignored_while_busy() {
        let mut form = filled(FormMode::SignIn);
        assert!(form.begin_submit().is_some());
        assert!(form.begin_submit().is_none());
    }
}
