//! Profile page.

use axum::{
    Form, Json,
    extract::State,
    response::Redirect,
};
use chrono::Utc;
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use agromaq_core::Profile;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::lookup::UFS;
use crate::middleware::RequireAuth;
use crate::models::Notice;
use crate::profile::ProfileForm;
use crate::state::AppState;

use super::{PageResponse, notify, page};

#[derive(Debug, Serialize)]
pub struct ProfilePage {
    pub email: String,
    pub form: ProfileForm,
    pub avatar_url: Option<String>,
    /// The profile row exists (it is created by a trigger on signup).
    pub exists: bool,
    pub states: &'static [&'static str],
}

/// Show the signed-in user's profile form.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Result<Json<PageResponse<ProfilePage>>> {
    let stored = state
        .supabase()
        .get_profile(user.id, Some(&user.access_token))
        .await?;
    let exists = stored.is_some();
    let profile = stored.unwrap_or_else(|| Profile::empty(user.id, Some(user.email.clone())));

    let data = ProfilePage {
        email: user.email.clone(),
        form: ProfileForm::from_profile(&profile),
        avatar_url: profile.avatar_url,
        exists,
        states: &UFS,
    };
    Ok(page("perfil", &session, Some(&user), data).await)
}

/// Validate and save the profile.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<ProfileForm>,
) -> Result<Redirect> {
    let update = form
        .validate(user.id, Utc::now())
        .map_err(AppError::Validation)?;

    match state
        .supabase()
        .upsert_profile(&update, &user.access_token)
        .await
    {
        Ok(_) => {
            add_breadcrumb("profile", "Profile saved", None);
            notify(&session, Notice::success("Perfil atualizado.")).await;
        }
        Err(e) => {
            let kind = e.kind();
            tracing::warn!(error = %e, kind = ?kind, "Profile save failed");
            notify(&session, Notice::error(kind.user_message())).await;
        }
    }
    Ok(Redirect::to("/perfil"))
}
