//! Comparison page and its mutations.
//!
//! The list lives in the visitor's session; every mutation writes it back
//! before redirecting.

use axum::{
    Form, Json,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use agromaq_core::{Product, ProductId};

use crate::compare::{self, AddOutcome, MAX_COMPARE_ITEMS};
use crate::error::Result;
use crate::middleware::{OptionalAuth, local_path_or};
use crate::models::Notice;
use crate::state::AppState;

use super::products::price_label;
use super::{PageResponse, notify, page};

const COMPARE_PATH: &str = "/comparar";

#[derive(Debug, Serialize)]
pub struct CompareRow {
    pub product: Product,
    pub price_label: String,
}

#[derive(Debug, Serialize)]
pub struct ComparePage {
    pub items: Vec<CompareRow>,
    pub max_items: usize,
}

/// Add/remove form. `voltar` is the page to return to.
#[derive(Debug, Deserialize)]
pub struct CompareForm {
    pub product_id: ProductId,
    #[serde(default)]
    pub voltar: Option<String>,
}

/// Clear form.
#[derive(Debug, Default, Deserialize)]
pub struct ClearForm {
    #[serde(default)]
    pub voltar: Option<String>,
}

/// Show the comparison.
pub async fn show(session: Session, OptionalAuth(user): OptionalAuth) -> Json<PageResponse<ComparePage>> {
    let list = compare::load(&session).await;
    let items = list
        .items()
        .iter()
        .map(|product| CompareRow {
            price_label: price_label(product),
            product: product.clone(),
        })
        .collect();

    page(
        "comparar",
        &session,
        user.as_ref(),
        ComparePage {
            items,
            max_items: MAX_COMPARE_ITEMS,
        },
    )
    .await
}

/// Add a listing to the comparison.
///
/// The current row is fetched and stored as a snapshot. Adding a listing
/// already present, or adding to a full list, changes nothing.
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CompareForm>,
) -> Result<Response> {
    let back = local_path_or(form.voltar.as_deref(), COMPARE_PATH).to_string();
    let mut list = compare::load(&session).await;

    if list.contains(form.product_id) {
        notify(&session, Notice::info(AddOutcome::AlreadyPresent.message())).await;
        return Ok(Redirect::to(&back).into_response());
    }
    if list.is_full() {
        notify(&session, Notice::warning(AddOutcome::Full.message())).await;
        return Ok(Redirect::to(&back).into_response());
    }

    let product = match state.supabase().get_product(form.product_id).await {
        Ok(product) => product,
        Err(e) => {
            let kind = e.kind();
            tracing::warn!(error = %e, kind = ?kind, "Could not load listing for comparison");
            notify(&session, Notice::error(kind.user_message())).await;
            return Ok(Redirect::to(&back).into_response());
        }
    };

    let outcome = list.add(product);
    let notice = match outcome {
        AddOutcome::Added => Notice::success(outcome.message()),
        AddOutcome::AlreadyPresent => Notice::info(outcome.message()),
        AddOutcome::Full => Notice::warning(outcome.message()),
    };
    compare::save(&session, &list).await?;
    notify(&session, notice).await;

    Ok(Redirect::to(&back).into_response())
}

/// Remove a listing. Removing something not in the list is a no-op.
pub async fn remove(session: Session, Form(form): Form<CompareForm>) -> Result<Redirect> {
    let mut list = compare::load(&session).await;
    if list.remove(form.product_id) {
        compare::save(&session, &list).await?;
    }
    Ok(Redirect::to(local_path_or(
        form.voltar.as_deref(),
        COMPARE_PATH,
    )))
}

/// Empty the comparison and drop it from the session.
pub async fn clear(session: Session, Form(form): Form<ClearForm>) -> Result<Redirect> {
    let mut list = compare::load(&session).await;
    list.clear();
    compare::save(&session, &list).await?;
    Ok(Redirect::to(local_path_or(
        form.voltar.as_deref(),
        COMPARE_PATH,
    )))
}
