//! Supabase REST clients: PostgREST tables, GoTrue auth and object storage.
//!
//! # Architecture
//!
//! - One [`SupabaseClient`] shared through `AppState`; cloning is cheap
//! - Every request carries the project's anon key as `apikey`
//! - The bearer is the signed-in user's access token when one is passed,
//!   so row-level security sees the caller; otherwise the anon key
//! - Failures come back as [`SupabaseError`], which callers classify with
//!   [`SupabaseError::kind`] before showing anything to users
//!
//! # Example
//!
//! ```rust,ignore
//! use agromaq_storefront::supabase::{Query, SupabaseClient};
//!
//! let client = SupabaseClient::new(&config.supabase, http)?;
//! let products: Vec<Product> = client
//!     .select(&Query::table("products").eq("type", "venda").order_desc("created_at"), None)
//!     .await?;
//! ```

mod auth;
mod rest;
mod storage;
mod tables;

pub use auth::{AuthSession, AuthUser, SignUpOutcome};
pub use rest::Query;
pub use storage::StoredObject;

use core::fmt;
use std::sync::Arc;

use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::SupabaseConfig;
use crate::error::ErrorKind;

/// Errors returned by the Supabase clients.
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// The request never produced a response (connection, DNS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Service error code, e.g. `PGRST116` or `invalid_credentials`.
        code: Option<String>,
        /// Human-readable message from the service.
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A request URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl SupabaseError {
    /// Classify this failure for retry decisions and user-facing messages.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(err) => {
                if err.is_timeout() {
                    ErrorKind::Timeout
                } else if err.is_connect() || err.is_request() || err.is_body() {
                    ErrorKind::Network
                } else {
                    ErrorKind::Unexpected
                }
            }
            Self::Api {
                status,
                code,
                message,
            } => ErrorKind::classify(Some(*status), code.as_deref(), message),
            Self::Parse(_) | Self::Url(_) => ErrorKind::Unexpected,
        }
    }

    /// Build an [`SupabaseError::Api`] from a failed response body.
    ///
    /// PostgREST answers `{code, message, details, hint}`; GoTrue answers
    /// either `{error, error_description}` or `{code, error_code, msg}`.
    pub(crate) fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

        let code = parsed.error_code.or_else(|| match parsed.code {
            Some(serde_json::Value::String(code)) => Some(code),
            _ => None,
        });
        let message = parsed
            .message
            .or(parsed.msg)
            .or(parsed.error_description)
            .or(parsed.error)
            .unwrap_or_else(|| body.chars().take(200).collect());

        Self::Api {
            status: status.as_u16(),
            code,
            message,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// A user access or refresh token.
///
/// Stored in the session so it must serialize, unlike `SecretString`; the
/// `Debug` impl still redacts it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// The raw token, for the `Authorization` header only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Client for a Supabase project.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    http: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
    bucket: String,
}

impl SupabaseClient {
    /// Create a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns an error if the project URL cannot be parsed.
    pub fn new(config: &SupabaseConfig, http: reqwest::Client) -> Result<Self, SupabaseError> {
        let mut raw = config.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw)?;

        Ok(Self {
            inner: Arc::new(SupabaseClientInner {
                http,
                base_url,
                anon_key: config.anon_key.clone(),
                bucket: config.storage_bucket.clone(),
            }),
        })
    }

    /// Resolve a path relative to the project URL.
    fn endpoint(&self, path: &str) -> Result<Url, SupabaseError> {
        Ok(self.inner.base_url.join(path)?)
    }

    /// Attach the project key and the caller's bearer token.
    fn authorize(&self, builder: RequestBuilder, token: Option<&AccessToken>) -> RequestBuilder {
        let anon_key = self.inner.anon_key.expose_secret();
        let bearer = token.map_or(anon_key, AccessToken::expose);
        builder.header("apikey", anon_key).bearer_auth(bearer)
    }

    /// Send a request and return the body of a successful response.
    async fn send(builder: RequestBuilder) -> Result<String, SupabaseError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let err = SupabaseError::from_response(status, &body);
            if status.is_server_error() {
                tracing::error!(
                    status = %status,
                    body = %body.chars().take(500).collect::<String>(),
                    "Supabase returned server error"
                );
            } else {
                tracing::debug!(status = %status, error = %err, "Supabase request rejected");
            }
            return Err(err);
        }

        Ok(body)
    }

    /// Parse a response body, logging the payload when it does not fit.
    fn parse<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, SupabaseError> {
        serde_json::from_str(body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse Supabase response"
            );
            SupabaseError::Parse(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgrest_not_found_body() {
        let body = r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#;
        let err = SupabaseError::from_response(StatusCode::NOT_ACCEPTABLE, body);

        match &err {
            SupabaseError::Api { status, code, .. } => {
                assert_eq!(*status, 406);
                assert_eq!(code.as_deref(), Some("PGRST116"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_gotrue_legacy_body() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        let err = SupabaseError::from_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[test]
    fn test_gotrue_coded_body() {
        let body = r#"{"code":400,"error_code":"email_not_confirmed","msg":"Email not confirmed"}"#;
        let err = SupabaseError::from_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.kind(), ErrorKind::EmailNotConfirmed);
    }

    #[test]
    fn test_unparseable_body_keeps_text() {
        let err = SupabaseError::from_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.to_string(), "API error (502): upstream down");
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("eyJhbGciOiJIUzI1NiJ9.secret".to_string());
        assert_eq!(format!("{token:?}"), "AccessToken([REDACTED])");
    }
}
