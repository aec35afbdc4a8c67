//! GoTrue password authentication.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use agromaq_core::{Email, UserId};

use super::{AccessToken, SupabaseClient, SupabaseError};

/// The authenticated user as GoTrue reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: AuthUser,
    pub access_token: AccessToken,
    pub refresh_token: AccessToken,
    pub expires_at: DateTime<Utc>,
}

/// Result of a signup request.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Email confirmation is disabled; the user is signed in.
    SignedIn(AuthSession),
    /// A confirmation email was sent.
    ConfirmationRequired(AuthUser),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        AuthSession {
            user: self.user,
            access_token: AccessToken::new(self.access_token),
            refresh_token: AccessToken::new(self.refresh_token),
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
        }
    }
}

impl SupabaseClient {
    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns an error whose kind is `InvalidCredentials` or
    /// `EmailNotConfirmed` for rejected logins.
    #[instrument(skip(self, email, password))]
    pub async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthSession, SupabaseError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let request = self
            .authorize(self.inner.http.post(url), None)
            .json(&json!({ "email": email.as_str(), "password": password }));
        let body = Self::send(request).await?;
        let token: TokenResponse = Self::parse(&body)?;
        Ok(token.into_session())
    }

    /// Exchange a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh token was revoked or expired.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_session(
        &self,
        refresh_token: &AccessToken,
    ) -> Result<AuthSession, SupabaseError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let request = self
            .authorize(self.inner.http.post(url), None)
            .json(&json!({ "refresh_token": refresh_token.expose() }));
        let body = Self::send(request).await?;
        let token: TokenResponse = Self::parse(&body)?;
        Ok(token.into_session())
    }

    /// Register a new account. `full_name` lands in the user metadata,
    /// where the profile trigger picks it up.
    ///
    /// # Errors
    ///
    /// Returns an error whose kind is `Duplicate` for a taken email.
    #[instrument(skip(self, email, password, full_name))]
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &str,
        full_name: &str,
        email_redirect_to: &str,
    ) -> Result<SignUpOutcome, SupabaseError> {
        let mut url = self.endpoint("auth/v1/signup")?;
        url.query_pairs_mut()
            .append_pair("redirect_to", email_redirect_to);

        let request = self.authorize(self.inner.http.post(url), None).json(&json!({
            "email": email.as_str(),
            "password": password,
            "data": { "full_name": full_name },
        }));
        let body = Self::send(request).await?;

        // A session comes back only when confirmation is disabled.
        let value: serde_json::Value = Self::parse(&body)?;
        if value.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(value)?;
            Ok(SignUpOutcome::SignedIn(token.into_session()))
        } else {
            let user: AuthUser = serde_json::from_value(value)?;
            Ok(SignUpOutcome::ConfirmationRequired(user))
        }
    }

    /// Send a password-recovery email whose link lands on `redirect_to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is rejected or rate limited.
    #[instrument(skip(self, email))]
    pub async fn send_password_recovery(
        &self,
        email: &Email,
        redirect_to: &str,
    ) -> Result<(), SupabaseError> {
        let mut url = self.endpoint("auth/v1/recover")?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);

        let request = self
            .authorize(self.inner.http.post(url), None)
            .json(&json!({ "email": email.as_str() }));
        Self::send(request).await?;
        Ok(())
    }

    /// Exchange the `token_hash` from a password-recovery link for a
    /// short-lived session.
    ///
    /// # Errors
    ///
    /// Returns an error whose kind is `Unauthorized` for used or expired links.
    #[instrument(skip(self, token_hash))]
    pub async fn verify_recovery(&self, token_hash: &str) -> Result<AuthSession, SupabaseError> {
        let url = self.endpoint("auth/v1/verify")?;
        let request = self
            .authorize(self.inner.http.post(url), None)
            .json(&json!({ "type": "recovery", "token_hash": token_hash }));
        let body = Self::send(request).await?;
        let token: TokenResponse = Self::parse(&body)?;
        Ok(token.into_session())
    }

    /// Look up the user owning `token`. Used to validate recovery tokens.
    ///
    /// # Errors
    ///
    /// Returns an error whose kind is `Unauthorized` for invalid tokens.
    #[instrument(skip(self, token))]
    pub async fn get_user(&self, token: &AccessToken) -> Result<AuthUser, SupabaseError> {
        let url = self.endpoint("auth/v1/user")?;
        let request = self.authorize(self.inner.http.get(url), Some(token));
        let body = Self::send(request).await?;
        Self::parse(&body)
    }

    /// Set a new password for the user owning `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid or the password is weak.
    #[instrument(skip(self, token, password))]
    pub async fn update_password(
        &self,
        token: &AccessToken,
        password: &str,
    ) -> Result<AuthUser, SupabaseError> {
        let url = self.endpoint("auth/v1/user")?;
        let request = self
            .authorize(self.inner.http.put(url), Some(token))
            .json(&json!({ "password": password }));
        let body = Self::send(request).await?;
        Self::parse(&body)
    }

    /// Revoke the session behind `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn sign_out(&self, token: &AccessToken) -> Result<(), SupabaseError> {
        let url = self.endpoint("auth/v1/logout")?;
        let request = self.authorize(self.inner.http.post(url), Some(token));
        Self::send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_into_session() {
        let body = r#"{
            "access_token": "at",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1760000000,
            "refresh_token": "rt",
            "user": {"id": "0b7f4f2e-8d7c-4d0e-bb0e-6f2f2a1c9d33", "email": "ana@fazenda.com.br", "role": "authenticated"}
        }"#;
        let token: TokenResponse = serde_json::from_str(body).unwrap();
        let before = Utc::now();
        let session = token.into_session();

        assert_eq!(session.access_token.expose(), "at");
        assert_eq!(session.user.email.as_deref(), Some("ana@fazenda.com.br"));
        assert!(session.expires_at >= before + Duration::seconds(3599));
    }
}
