//! Unified error handling with Sentry integration.
//!
//! Two layers:
//!
//! - [`ErrorKind`] classifies any failure from the remote store or the
//!   lookup services and owns the user-facing (pt-BR) message for it.
//! - [`AppError`] is what route handlers return. It captures server-side
//!   failures to Sentry and never exposes internal details to clients.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::lookup::LookupError;
use crate::supabase::SupabaseError;

/// Classification of a data-access failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The service could not be reached.
    Network,
    /// The service did not answer in time.
    Timeout,
    /// The requested record does not exist.
    NotFound,
    /// Wrong email or password.
    InvalidCredentials,
    /// Login attempted before confirming the email address.
    EmailNotConfirmed,
    /// A unique constraint was violated.
    Duplicate,
    /// The service rejected the data.
    Validation,
    /// Too many requests.
    RateLimited,
    /// Missing, expired or insufficient credentials.
    Unauthorized,
    /// Anything else.
    Unexpected,
}

impl ErrorKind {
    /// Classify from whatever the service told us. Codes win over message
    /// text, and message text wins over the bare HTTP status.
    #[must_use]
    pub fn classify(status: Option<u16>, code: Option<&str>, message: &str) -> Self {
        if let Some(kind) = code.and_then(Self::from_code) {
            return kind;
        }
        if let Some(kind) = Self::from_message(message) {
            return kind;
        }
        match status {
            Some(401 | 403) => Self::Unauthorized,
            Some(404) => Self::NotFound,
            Some(408 | 504) => Self::Timeout,
            Some(409) => Self::Duplicate,
            Some(400 | 422) => Self::Validation,
            Some(429) => Self::RateLimited,
            Some(502 | 503) => Self::Network,
            _ => Self::Unexpected,
        }
    }

    /// Known PostgREST, Postgres and GoTrue error codes.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let kind = match code {
            "PGRST116" => Self::NotFound,
            "23505" | "user_already_exists" | "email_exists" => Self::Duplicate,
            "P0001" | "23502" | "23514" | "22P02" | "weak_password" | "validation_failed" => {
                Self::Validation
            }
            "invalid_credentials" => Self::InvalidCredentials,
            "email_not_confirmed" => Self::EmailNotConfirmed,
            "over_request_rate_limit" | "over_email_send_rate_limit" => Self::RateLimited,
            "PGRST301" | "42501" | "bad_jwt" | "session_not_found" | "no_authorization" => {
                Self::Unauthorized
            }
            _ => return None,
        };
        Some(kind)
    }

    /// Recognize failures from message text alone.
    #[must_use]
    pub fn from_message(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        let has = |needle: &str| lower.contains(needle);

        if has("failed to fetch") || has("networkerror") || has("network request failed") {
            Some(Self::Network)
        } else if has("timed out") || has("timeout") {
            Some(Self::Timeout)
        } else if has("invalid login credentials") {
            Some(Self::InvalidCredentials)
        } else if has("email not confirmed") {
            Some(Self::EmailNotConfirmed)
        } else if has("already registered") || has("duplicate key") {
            Some(Self::Duplicate)
        } else if has("jwt expired") {
            Some(Self::Unauthorized)
        } else if has("rate limit") {
            Some(Self::RateLimited)
        } else {
            None
        }
    }

    /// Transient failures worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }

    /// Message shown to users.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Network => "Erro de conexão. Verifique sua internet e tente novamente.",
            Self::Timeout => "O servidor demorou para responder. Tente novamente.",
            Self::NotFound => "Registro não encontrado.",
            Self::InvalidCredentials => "E-mail ou senha incorretos.",
            Self::EmailNotConfirmed => "Confirme seu e-mail antes de entrar.",
            Self::Duplicate => "Este registro já existe.",
            Self::Validation => "Dados inválidos. Verifique os campos e tente novamente.",
            Self::RateLimited => "Muitas tentativas. Aguarde alguns instantes.",
            Self::Unauthorized => "Sua sessão expirou. Entre novamente.",
            Self::Unexpected => "Ocorreu um erro inesperado. Tente novamente.",
        }
    }

    pub(crate) const fn status(self) -> StatusCode {
        match self {
            Self::Network => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidCredentials | Self::EmailNotConfirmed | Self::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            Self::Duplicate => StatusCode::CONFLICT,
            Self::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Map a failure message to what users see.
///
/// `"Failed to fetch"` becomes the connection message; a `PGRST116` code
/// becomes the not-found message; anything unrecognized falls back to the
/// generic message.
#[must_use]
pub fn user_message_for(code: Option<&str>, message: &str) -> &'static str {
    ErrorKind::classify(None, code, message).user_message()
}

/// A validation failure on one form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    /// Create a field error.
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Remote store operation failed.
    #[error("Supabase error: {0}")]
    Supabase(#[from] SupabaseError),

    /// CEP or IBGE lookup failed.
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but does not own the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Form input failed validation.
    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Classification shared with the data-access layer.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Supabase(err) => err.kind(),
            Self::Lookup(err) => err.kind(),
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) | Self::Forbidden(_) => ErrorKind::Unauthorized,
            Self::BadRequest(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::Session(_) | Self::Internal(_) => ErrorKind::Unexpected,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    kind: ErrorKind,
    #[serde(skip_serializing_if = "no_fields")]
    fields: &'a [FieldError],
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_fields(fields: &&[FieldError]) -> bool {
    fields.is_empty()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();

        // Capture server errors to Sentry
        if kind == ErrorKind::Unexpected {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, kind = ?kind, "Request failed");
        }

        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => kind.status(),
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::NotFound(msg) | Self::BadRequest(msg) | Self::Forbidden(msg) => msg.as_str(),
            _ => kind.user_message(),
        };
        let fields = match &self {
            Self::Validation(fields) => fields.as_slice(),
            _ => &[],
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                kind,
                fields,
            }),
        )
            .into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("listing", "Published listing", Some(&[("product_id", "…")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
