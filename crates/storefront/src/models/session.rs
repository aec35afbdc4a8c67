//! Session-related types.
//!
//! Types stored in the session for authentication state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use agromaq_core::UserId;

use crate::supabase::{AccessToken, AuthSession};

/// Refresh this long before the access token actually expires.
const REFRESH_MARGIN_SECONDS: i64 = 60;

/// Session-stored user identity plus the tokens needed to act as them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    pub access_token: AccessToken,
    pub refresh_token: AccessToken,
    pub expires_at: DateTime<Utc>,
}

impl CurrentUser {
    /// Whether the access token is expired or about to be.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECONDS) >= self.expires_at
    }

    /// Public part, safe to hand to pages.
    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            email: self.email.clone(),
        }
    }
}

impl From<AuthSession> for CurrentUser {
    fn from(session: AuthSession) -> Self {
        Self {
            id: session.user.id,
            email: session.user.email.unwrap_or_default(),
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_at: session.expires_at,
        }
    }
}

/// Signed-in user as shown in page payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
}

/// Session keys.
pub mod keys {
    /// The signed-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Comparison list, as a JSON string.
    pub const COMPARE_LIST: &str = "compare_list";

    /// Pending one-shot notices.
    pub const NOTICES: &str = "notices";

    /// Access token from a password-recovery link.
    pub const RECOVERY_TOKEN: &str = "recovery_token";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supabase::AuthUser;

    #[test]
    fn test_from_auth_session_and_refresh_window() {
        let now = Utc::now();
        let user: CurrentUser = AuthSession {
            user: AuthUser {
                id: UserId::generate(),
                email: Some("ana@fazenda.com.br".to_string()),
            },
            access_token: AccessToken::new("at".to_string()),
            refresh_token: AccessToken::new("rt".to_string()),
            expires_at: now + Duration::seconds(3600),
        }
        .into();

        assert_eq!(user.email, "ana@fazenda.com.br");
        assert!(!user.needs_refresh(now));
        assert!(user.needs_refresh(now + Duration::seconds(3550)));
    }
}
