//! Institutional markdown pages.

use axum::{Json, extract::State};
use tower_sessions::Session;

use crate::content::Page;
use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::state::AppState;

use super::{PageResponse, page};

async fn content_page(
    slug: &'static str,
    state: &AppState,
    session: &Session,
    user: OptionalAuth,
) -> Result<Json<PageResponse<Page>>> {
    let content = state.content().get_page(slug).cloned().ok_or_else(|| {
        tracing::warn!(slug, "Content page missing");
        AppError::NotFound("Página não encontrada.".to_string())
    })?;
    Ok(page(slug, session, user.0.as_ref(), content).await)
}

/// `/como-funciona`: how buying, selling and renting work, with FAQ.
pub async fn how_it_works(
    State(state): State<AppState>,
    session: Session,
    user: OptionalAuth,
) -> Result<Json<PageResponse<Page>>> {
    content_page("como-funciona", &state, &session, user).await
}

/// `/sobre`
pub async fn about(
    State(state): State<AppState>,
    session: Session,
    user: OptionalAuth,
) -> Result<Json<PageResponse<Page>>> {
    content_page("sobre", &state, &session, user).await
}
