//! Authentication gate and extractors.
//!
//! Protected pages (`/vender`, `/perfil`, `/meus-anuncios`,
//! `/editar-anuncio/*`) are guarded twice: [`auth_gate`] redirects
//! anonymous visitors before any handler runs, and handlers take
//! [`RequireAuth`] to get the signed-in user.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tower_sessions::Session;

use crate::error::{ErrorKind, clear_sentry_user, set_sentry_user};
use crate::models::{CurrentUser, Notice, session_keys};
use crate::state::AppState;

/// Login page path.
pub const LOGIN_PATH: &str = "/entrar";

/// Where to land after login when no usable redirect was given.
pub const DEFAULT_AFTER_LOGIN: &str = "/perfil";

const PROTECTED_PREFIXES: &[&str] = &["/vender", "/perfil", "/meus-anuncios", "/editar-anuncio"];

/// Whether `path` requires a signed-in user.
#[must_use]
pub fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Login URL that sends the visitor back to `target` afterwards.
#[must_use]
pub fn login_redirect(target: &str) -> String {
    format!("{LOGIN_PATH}?redirect={}", urlencoding::encode(target))
}

/// `requested` if it is a same-site absolute path, otherwise `fallback`.
#[must_use]
pub fn local_path_or<'a>(requested: Option<&'a str>, fallback: &'a str) -> &'a str {
    match requested.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => fallback,
    }
}

/// Post-login destination.
#[must_use]
pub fn safe_redirect_target(requested: Option<&str>) -> &str {
    local_path_or(requested, DEFAULT_AFTER_LOGIN)
}

/// Error returned when authentication is required but the user is not logged in.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page, carrying the URL to return to.
    RedirectToLogin(String),
    /// Unauthorized response (for API requests).
    Unauthorized,
}

impl AuthRejection {
    fn for_request(path: &str, path_and_query: &str) -> Self {
        if path.starts_with("/api/") {
            Self::Unauthorized
        } else {
            Self::RedirectToLogin(path_and_query.to_string())
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin(target) => Redirect::to(&login_redirect(&target)).into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

/// Middleware guarding protected paths.
///
/// Anonymous visitors are redirected to the login page. A signed-in user
/// whose access token is about to expire gets it refreshed here; if that
/// fails the user is signed out and sent to log in again.
pub async fn auth_gate(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !is_protected(&path) {
        return next.run(request).await;
    }

    let path_and_query = request
        .uri()
        .path_and_query()
        .map_or_else(|| path.clone(), ToString::to_string);

    let user = match session.get::<CurrentUser>(session_keys::CURRENT_USER).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::debug!(path = %path, "Anonymous request to protected page");
            return AuthRejection::for_request(&path, &path_and_query).into_response();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read session");
            return AuthRejection::for_request(&path, &path_and_query).into_response();
        }
    };

    let user = if user.needs_refresh(Utc::now()) {
        match state.supabase().refresh_session(&user.refresh_token).await {
            Ok(refreshed) => {
                let refreshed = CurrentUser::from(refreshed);
                if let Err(e) = set_current_user(&session, &refreshed).await {
                    tracing::warn!(error = %e, "Failed to store refreshed session");
                }
                tracing::debug!(user_id = %refreshed.id, "Access token refreshed");
                refreshed
            }
            Err(e) => {
                tracing::info!(user_id = %user.id, error = %e, "Token refresh failed, signing out");
                if let Err(e) = clear_current_user(&session).await {
                    tracing::warn!(error = %e, "Failed to clear session");
                }
                let notice = Notice::warning(ErrorKind::Unauthorized.user_message());
                if let Err(e) = notice.push(&session).await {
                    tracing::warn!(error = %e, "Failed to queue notice");
                }
                return AuthRejection::for_request(&path, &path_and_query).into_response();
            }
        }
    } else {
        user
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Extractor that requires a signed-in user.
///
/// Prefers the user the gate already validated for this request and falls
/// back to the session.
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(Self(user.clone()));
        }

        let path_and_query = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
        let rejection = || AuthRejection::for_request(parts.uri.path(), &path_and_query);

        let session = parts.extensions.get::<Session>().ok_or_else(rejection)?;
        let user: CurrentUser = session
            .get(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten()
            .ok_or_else(rejection)?;

        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is logged in.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(Self(Some(user.clone())));
        }

        let user = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentUser>(session_keys::CURRENT_USER)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(user))
    }
}

/// Store the signed-in user, rotating the session id.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await?;
    set_sentry_user(&user.id, Some(&user.email));
    Ok(())
}

/// Forget the signed-in user (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    session.remove::<String>(session_keys::RECOVERY_TOKEN).await?;
    clear_sentry_user();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_paths() {
        assert!(is_protected("/vender"));
        assert!(is_protected("/perfil"));
        assert!(is_protected("/meus-anuncios"));
        assert!(is_protected("/editar-anuncio/6f1c2a9e-4b8d-4a52-9a57-0d5b2f7c9e11"));
        assert!(!is_protected("/"));
        assert!(!is_protected("/comprar"));
        assert!(!is_protected("/entrar"));
        assert!(!is_protected("/vendedores"));
        assert!(!is_protected("/produto/abc"));
    }

    #[test]
    fn test_login_redirect_encodes_target() {
        assert_eq!(login_redirect("/perfil"), "/entrar?redirect=%2Fperfil");
        assert_eq!(
            login_redirect("/vender?tipo=aluguel"),
            "/entrar?redirect=%2Fvender%3Ftipo%3Daluguel"
        );
    }

    #[test]
    fn test_safe_redirect_target() {
        assert_eq!(safe_redirect_target(Some("/meus-anuncios")), "/meus-anuncios");
        assert_eq!(safe_redirect_target(Some("//evil.example")), DEFAULT_AFTER_LOGIN);
        assert_eq!(safe_redirect_target(Some("https://evil.example")), DEFAULT_AFTER_LOGIN);
        assert_eq!(safe_redirect_target(Some("/\\evil.example")), DEFAULT_AFTER_LOGIN);
        assert_eq!(safe_redirect_target(None), DEFAULT_AFTER_LOGIN);
        assert_eq!(local_path_or(Some(""), "/comparar"), "/comparar");
    }

    #[test]
    fn test_api_requests_get_unauthorized() {
        assert!(matches!(
            AuthRejection::for_request("/api/estados", "/api/estados"),
            AuthRejection::Unauthorized
        ));
        assert!(matches!(
            AuthRejection::for_request("/perfil", "/perfil"),
            AuthRejection::RedirectToLogin(target) if target == "/perfil"
        ));
    }
}
