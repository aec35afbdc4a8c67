//! One-shot notices carried across a redirect.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use super::session_keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A message for the next page the visitor sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    /// Queue for the next page.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be modified.
    pub async fn push(self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        let mut pending: Vec<Self> = session
            .get(session_keys::NOTICES)
            .await?
            .unwrap_or_default();
        pending.push(self);
        session.insert(session_keys::NOTICES, pending).await
    }

    /// Take every queued notice, leaving none behind.
    pub async fn take_all(session: &Session) -> Vec<Self> {
        match session.remove::<Vec<Self>>(session_keys::NOTICES).await {
            Ok(notices) => notices.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read notices from session");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_notices_are_consumed_once() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        Notice::success("Anúncio publicado.").push(&session).await.unwrap();
        Notice::warning("1 imagem ignorada.").push(&session).await.unwrap();

        let notices = Notice::take_all(&session).await;
        assert_eq!(notices.len(), 2);
        assert_eq!(notices.first().unwrap().level, NoticeLevel::Success);
        assert!(Notice::take_all(&session).await.is_empty());
    }
}
