//! Authentication route handlers.
//!
//! Login, signup, logout and password recovery over GoTrue. Failures are
//! reported as notices on the page the visitor is sent back to; malformed
//! input answers `422` with field errors.

use axum::{
    Form, Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use agromaq_core::Email;

use crate::error::{AppError, ErrorKind, FieldError, Result, add_breadcrumb};
use crate::middleware::{
    OptionalAuth, clear_current_user, login_redirect, safe_redirect_target, set_current_user,
};
use crate::models::{CurrentUser, Notice, session_keys};
use crate::state::AppState;
use crate::supabase::{AccessToken, SignUpOutcome};

use super::{PageResponse, notify, page};

/// GoTrue's default minimum.
pub const MIN_PASSWORD_LENGTH: usize = 6;

const RECOVER_PATH: &str = "/entrar/recuperar";
const RESET_PATH: &str = "/entrar/nova-senha";
const SIGNUP_PATH: &str = "/entrar/cadastro";

// =============================================================================
// Form Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignUpForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct RecoverForm {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct NewPasswordForm {
    pub password: String,
    pub password_confirm: String,
}

// =============================================================================
// Query Types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub redirect: Option<String>,
}

/// Parameters a recovery link can land with.
#[derive(Debug, Default, Deserialize)]
pub struct RecoveryQuery {
    /// Email template link: `?token_hash=...&type=recovery`.
    pub token_hash: Option<String>,
    /// Token forwarded by a client that read it from the URL fragment.
    pub access_token: Option<String>,
    pub error_description: Option<String>,
}

// =============================================================================
// Page Data
// =============================================================================

#[derive(Debug, Serialize)]
pub struct LoginPage {
    /// Where a successful login will land.
    pub redirect: String,
    pub signed_in: bool,
}

#[derive(Debug, Serialize)]
pub struct SignUpPage {
    pub min_password_length: usize,
}

#[derive(Debug, Serialize)]
pub struct RecoverPage {}

#[derive(Debug, Serialize)]
pub struct NewPasswordPage {
    /// A valid recovery token is held in the session.
    pub recovery_ready: bool,
    pub min_password_length: usize,
}

/// Check a new password and its confirmation.
#[must_use]
pub fn password_errors(password: &str, confirm: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(FieldError::new(
            "password",
            format!("A senha deve ter pelo menos {MIN_PASSWORD_LENGTH} caracteres."),
        ));
    }
    if password != confirm {
        errors.push(FieldError::new(
            "password_confirm",
            "As senhas não conferem.",
        ));
    }
    errors
}

fn parse_email(raw: &str) -> Result<Email> {
    Email::parse(raw)
        .map_err(|_| AppError::Validation(vec![FieldError::new("email", "E-mail inválido.")]))
}

// =============================================================================
// Login / Logout
// =============================================================================

/// Display the login page. Never redirects, even for signed-in users.
pub async fn login_page(
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<LoginQuery>,
) -> Json<PageResponse<LoginPage>> {
    let data = LoginPage {
        redirect: safe_redirect_target(query.redirect.as_deref()).to_string(),
        signed_in: user.is_some(),
    };
    page("entrar", &session, user.as_ref(), data).await
}

/// Handle login form submission.
#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let target = safe_redirect_target(form.redirect.as_deref()).to_string();
    let email = parse_email(&form.email)?;

    match state
        .supabase()
        .sign_in_with_password(&email, &form.password)
        .await
    {
        Ok(auth) => {
            let user = CurrentUser::from(auth);
            set_current_user(&session, &user).await?;
            add_breadcrumb("auth", "Signed in", None);
            tracing::info!(user_id = %user.id, "User signed in");
            Ok(Redirect::to(&target).into_response())
        }
        Err(e) => {
            let kind = e.kind();
            tracing::info!(kind = ?kind, "Login rejected");
            notify(&session, Notice::error(kind.user_message())).await;
            Ok(Redirect::to(&login_redirect(&target)).into_response())
        }
    }
}

/// Sign out and return home.
pub async fn logout(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let user: Option<CurrentUser> = session.get(session_keys::CURRENT_USER).await?;
    if let Some(user) = user {
        if let Err(e) = state.supabase().sign_out(&user.access_token).await {
            tracing::warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
        }
        tracing::info!(user_id = %user.id, "User signed out");
    }
    clear_current_user(&session).await?;
    notify(&session, Notice::info("Você saiu da sua conta.")).await;
    Ok(Redirect::to("/"))
}

// =============================================================================
// Signup
// =============================================================================

/// Display the signup page.
pub async fn register_page(
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Json<PageResponse<SignUpPage>> {
    let data = SignUpPage {
        min_password_length: MIN_PASSWORD_LENGTH,
    };
    page("cadastro", &session, user.as_ref(), data).await
}

/// Handle signup form submission.
#[instrument(skip(state, session, form))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<SignUpForm>,
) -> Result<Response> {
    let mut errors = password_errors(&form.password, &form.password_confirm);
    let full_name = form.full_name.trim();
    if full_name.is_empty() {
        errors.push(FieldError::new("full_name", "Informe seu nome."));
    }
    let email = Email::parse(&form.email);
    if email.is_err() {
        errors.push(FieldError::new("email", "E-mail inválido."));
    }
    let email = match email {
        Ok(email) if errors.is_empty() => email,
        _ => return Err(AppError::Validation(errors)),
    };

    let confirm_url = state.config().absolute_url("/entrar");
    match state
        .supabase()
        .sign_up(&email, &form.password, full_name, &confirm_url)
        .await
    {
        Ok(SignUpOutcome::SignedIn(auth)) => {
            let user = CurrentUser::from(auth);
            set_current_user(&session, &user).await?;
            tracing::info!(user_id = %user.id, "Account created");
            notify(
                &session,
                Notice::success("Conta criada! Complete seu perfil para anunciar."),
            )
            .await;
            Ok(Redirect::to("/perfil").into_response())
        }
        Ok(SignUpOutcome::ConfirmationRequired(user)) => {
            tracing::info!(user_id = %user.id, "Account created, awaiting confirmation");
            notify(
                &session,
                Notice::info(format!(
                    "Enviamos um link de confirmação para {email}. Confirme para entrar."
                )),
            )
            .await;
            Ok(Redirect::to("/entrar").into_response())
        }
        Err(e) => {
            let kind = e.kind();
            tracing::info!(kind = ?kind, "Signup rejected");
            let message = match kind {
                ErrorKind::Duplicate => "Este e-mail já está cadastrado.",
                other => other.user_message(),
            };
            notify(&session, Notice::error(message)).await;
            Ok(Redirect::to(SIGNUP_PATH).into_response())
        }
    }
}

// =============================================================================
// Password Recovery
// =============================================================================

/// Display the "forgot password" page.
pub async fn recover_page(
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Json<PageResponse<RecoverPage>> {
    page("recuperar", &session, user.as_ref(), RecoverPage {}).await
}

/// Send a recovery email.
///
/// The answer is the same whether or not the address has an account;
/// only connectivity problems are reported as such.
#[instrument(skip(state, session, form))]
pub async fn recover(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RecoverForm>,
) -> Result<Redirect> {
    let email = parse_email(&form.email)?;
    let link_target = state.config().absolute_url(RESET_PATH);

    match state
        .supabase()
        .send_password_recovery(&email, &link_target)
        .await
    {
        Ok(()) => {}
        Err(e) if e.kind().is_transient() || e.kind() == ErrorKind::RateLimited => {
            tracing::warn!(error = %e, "Recovery email not sent");
            notify(&session, Notice::error(e.kind().user_message())).await;
            return Ok(Redirect::to(RECOVER_PATH));
        }
        Err(e) => {
            tracing::info!(error = %e, "Recovery request rejected");
        }
    }

    notify(
        &session,
        Notice::success(
            "Se houver uma conta com este e-mail, você receberá um link para redefinir a senha.",
        ),
    )
    .await;
    Ok(Redirect::to("/entrar"))
}

/// Landing page of the recovery link.
///
/// A valid token is kept in the session, marking a recovery in progress
/// until the new password is saved.
#[instrument(skip_all)]
pub async fn reset_page(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<RecoveryQuery>,
) -> Result<Json<PageResponse<NewPasswordPage>>> {
    if let Some(description) = query.error_description.as_deref() {
        tracing::info!(description, "Recovery link rejected upstream");
        notify(&session, Notice::error("Link de recuperação inválido ou expirado.")).await;
    }

    let verified = if let Some(hash) = query.token_hash.as_deref() {
        state
            .supabase()
            .verify_recovery(hash)
            .await
            .map(|auth| Some(auth.access_token))
    } else if let Some(raw) = query.access_token {
        let token = AccessToken::new(raw);
        state
            .supabase()
            .get_user(&token)
            .await
            .map(|_| Some(token))
    } else {
        Ok(None)
    };

    match verified {
        Ok(Some(token)) => {
            session.insert(session_keys::RECOVERY_TOKEN, &token).await?;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::info!(error = %e, "Recovery token rejected");
            notify(&session, Notice::error("Link de recuperação inválido ou expirado.")).await;
        }
    }

    let recovery_ready = session
        .get::<AccessToken>(session_keys::RECOVERY_TOKEN)
        .await?
        .is_some();
    let data = NewPasswordPage {
        recovery_ready,
        min_password_length: MIN_PASSWORD_LENGTH,
    };
    Ok(page("nova-senha", &session, user.as_ref(), data).await)
}

/// Save the new password for the recovery in progress.
#[instrument(skip_all)]
pub async fn reset(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<NewPasswordForm>,
) -> Result<Redirect> {
    let Some(token) = session
        .get::<AccessToken>(session_keys::RECOVERY_TOKEN)
        .await?
    else {
        notify(
            &session,
            Notice::warning("Solicite um novo link para redefinir a senha."),
        )
        .await;
        return Ok(Redirect::to(RECOVER_PATH));
    };

    let errors = password_errors(&form.password, &form.password_confirm);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    match state.supabase().update_password(&token, &form.password).await {
        Ok(user) => {
            session
                .remove::<AccessToken>(session_keys::RECOVERY_TOKEN)
                .await?;
            tracing::info!(user_id = %user.id, "Password reset");
            notify(
                &session,
                Notice::success("Senha alterada. Entre com a nova senha."),
            )
            .await;
            Ok(Redirect::to("/entrar"))
        }
        Err(e) => {
            let kind = e.kind();
            tracing::info!(kind = ?kind, "Password update rejected");
            if kind == ErrorKind::Unauthorized {
                session
                    .remove::<AccessToken>(session_keys::RECOVERY_TOKEN)
                    .await?;
            }
            notify(&session, Notice::error(kind.user_message())).await;
            Ok(Redirect::to(RESET_PATH))
        }
    }
}
