//! Home page route handler.

use axum::{Json, extract::State};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use agromaq_core::ListingType;

use crate::catalog::{ProductFilters, ProductListState};
use crate::middleware::OptionalAuth;
use crate::state::AppState;

use super::products::{CategoryOption, category_options};
use super::{PageResponse, page};

/// Listings shown per section on the home page.
const HOME_SECTION_SIZE: usize = 8;

#[derive(Debug, Serialize)]
pub struct HomePage {
    pub for_sale: ProductListState,
    pub for_rent: ProductListState,
    pub categories: Vec<CategoryOption>,
}

fn newest(mut state: ProductListState) -> ProductListState {
    state.products.truncate(HOME_SECTION_SIZE);
    state
}

/// Display the home page: the newest listings of each type.
///
/// Shares the catalog cache entries with `/comprar` and `/alugar`.
#[instrument(skip_all)]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Json<PageResponse<HomePage>> {
    let sale_filters = ProductFilters::of_type(ListingType::Sale);
    let rental_filters = ProductFilters::of_type(ListingType::Rental);
    let (for_sale, for_rent) = tokio::join!(
        state.catalog().fetch(&sale_filters),
        state.catalog().fetch(&rental_filters),
    );

    page(
        "home",
        &session,
        user.as_ref(),
        HomePage {
            for_sale: newest(for_sale),
            for_rent: newest(for_rent),
            categories: category_options(),
        },
    )
    .await
}
