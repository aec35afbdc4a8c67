//! Listing browse and detail pages.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use agromaq_core::{Category, ListingType, Price, Product, ProductId, Profile};

use crate::catalog::{ProductFilters, ProductListState};
use crate::compare;
use crate::error::{AppError, ErrorKind, Result};
use crate::listing::image_urls;
use crate::middleware::OptionalAuth;
use crate::state::AppState;

use super::{PageResponse, page};

/// Filters accepted as query parameters on `/comprar` and `/alugar`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub marca: Option<String>,
    pub categoria: Option<String>,
    pub localizacao: Option<String>,
    pub preco_max: Option<String>,
    /// `1`, `true` or `sim` bypasses the cache.
    pub atualizar: Option<String>,
}

impl ListQuery {
    /// Filters for one listing type. Blank parameters are ignored.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an unknown category or an unparseable price.
    pub fn to_filters(&self, listing_type: ListingType) -> Result<ProductFilters> {
        let category = match non_blank(self.categoria.as_deref()) {
            Some(raw) => Some(
                raw.parse::<Category>()
                    .map_err(|_| AppError::BadRequest("Categoria inválida.".to_string()))?,
            ),
            None => None,
        };
        let max_price = match non_blank(self.preco_max.as_deref()) {
            Some(raw) => Some(
                Price::parse_input(raw)
                    .map_err(|_| AppError::BadRequest("Preço máximo inválido.".to_string()))?,
            ),
            None => None,
        };

        Ok(ProductFilters {
            listing_type: Some(listing_type),
            brand: self.marca.clone(),
            category,
            location: self.localizacao.clone(),
            max_price,
            owner: None,
        }
        .normalized())
    }

    fn wants_refresh(&self) -> bool {
        non_blank(self.atualizar.as_deref()).is_some_and(|v| {
            ["1", "true", "sim"]
                .iter()
                .any(|yes| v.eq_ignore_ascii_case(yes))
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A category choice for the filter bar.
#[derive(Debug, Serialize)]
pub struct CategoryOption {
    pub value: &'static str,
    pub label: &'static str,
}

#[must_use]
pub fn category_options() -> Vec<CategoryOption> {
    Category::ALL
        .iter()
        .map(|c| CategoryOption {
            value: c.as_str(),
            label: c.label(),
        })
        .collect()
}

/// Data for `/comprar` and `/alugar`.
#[derive(Debug, Serialize)]
pub struct ListingsPage {
    pub listing_type: ListingType,
    pub filters: ProductFilters,
    pub categories: Vec<CategoryOption>,
    pub listings: ProductListState,
    pub compare_ids: Vec<ProductId>,
}

/// Listings for sale.
pub async fn buy(
    state: State<AppState>,
    session: Session,
    auth: OptionalAuth,
    query: Query<ListQuery>,
) -> Result<Json<PageResponse<ListingsPage>>> {
    browse(ListingType::Sale, "comprar", state, session, auth, query).await
}

/// Listings for rent.
pub async fn rent(
    state: State<AppState>,
    session: Session,
    auth: OptionalAuth,
    query: Query<ListQuery>,
) -> Result<Json<PageResponse<ListingsPage>>> {
    browse(ListingType::Rental, "alugar", state, session, auth, query).await
}

#[instrument(skip(state, session, user, query))]
async fn browse(
    listing_type: ListingType,
    name: &'static str,
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<ListingsPage>>> {
    let filters = query.to_filters(listing_type)?;
    let listings = if query.wants_refresh() {
        state.catalog().refetch(&filters).await
    } else {
        state.catalog().fetch(&filters).await
    };
    let compare_ids = compare::load(&session)
        .await
        .items()
        .iter()
        .map(|p| p.id)
        .collect();

    Ok(page(
        name,
        &session,
        user.as_ref(),
        ListingsPage {
            listing_type,
            filters,
            categories: category_options(),
            listings,
            compare_ids,
        },
    )
    .await)
}

/// Seller details shown on a listing.
#[derive(Debug, Serialize)]
pub struct SellerCard {
    pub name: Option<String>,
    pub company_name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<Profile> for SellerCard {
    fn from(profile: Profile) -> Self {
        Self {
            location: profile.location_label(),
            name: profile.full_name,
            company_name: profile.company_name,
            phone: profile.phone,
            bio: profile.bio,
            avatar_url: profile.avatar_url,
        }
    }
}

/// Data for `/produto/{id}`.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub product: Product,
    /// Primary image first, then the gallery in position order.
    pub images: Vec<String>,
    /// e.g. `R$ 1.200,00 por dia`.
    pub price_label: String,
    pub seller: Option<SellerCard>,
    pub is_owner: bool,
    pub in_compare: bool,
    pub compare_full: bool,
}

/// `"R$ 1.200,00"`, or `"R$ 1.200,00 por dia"` for rentals.
#[must_use]
pub fn price_label(product: &Product) -> String {
    match (product.listing_type, product.rental_period) {
        (ListingType::Rental, Some(period)) => format!("{} {}", product.price, period.label()),
        _ => product.price.display(),
    }
}

/// Listing detail. Not cached: sellers expect to see edits immediately.
#[instrument(skip(state, session, user), fields(product_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<ProductId>,
) -> Result<Json<PageResponse<ProductPage>>> {
    let product = match state.supabase().get_product(id).await {
        Ok(product) => product,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::NotFound("Anúncio não encontrado.".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let gallery = state
        .supabase()
        .get_product_images(id)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load gallery, showing primary image only");
            Vec::new()
        });
    let seller = match state.supabase().get_profile(product.user_id, None).await {
        Ok(profile) => profile.map(SellerCard::from),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load seller profile");
            None
        }
    };

    let comparison = compare::load(&session).await;
    let data = ProductPage {
        images: image_urls(&product, &gallery),
        price_label: price_label(&product),
        seller,
        is_owner: user.as_ref().is_some_and(|u| product.is_owned_by(u.id)),
        in_compare: comparison.contains(product.id),
        compare_full: comparison.is_full(),
        product,
    };

    Ok(page("produto", &session, user.as_ref(), data).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_query_to_filters() {
        let query = ListQuery {
            marca: Some("  Massey Ferguson ".to_string()),
            categoria: Some("tratores".to_string()),
            localizacao: Some(String::new()),
            preco_max: Some("250.000,00".to_string()),
            atualizar: None,
        };
        let filters = query.to_filters(ListingType::Sale).unwrap();

        assert_eq!(filters.listing_type, Some(ListingType::Sale));
        assert_eq!(filters.brand.as_deref(), Some("Massey Ferguson"));
        assert_eq!(filters.category, Some(Category::Tractors));
        assert_eq!(filters.location, None);
        assert_eq!(
            filters.max_price.map(|p| p.amount()),
            Some(Decimal::new(250_000, 0))
        );
    }

    #[test]
    fn test_query_rejects_unknown_category() {
        let query = ListQuery {
            categoria: Some("drones".to_string()),
            ..ListQuery::default()
        };
        assert!(matches!(
            query.to_filters(ListingType::Rental),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_refresh_flag() {
        let query = ListQuery {
            atualizar: Some("1".to_string()),
            ..ListQuery::default()
        };
        assert!(query.wants_refresh());
        assert!(!ListQuery::default().wants_refresh());
    }

    #[test]
    fn test_falsy_refresh_values_keep_cache() {
        let with = |v: &str| ListQuery {
            atualizar: Some(v.to_string()),
            ..ListQuery::default()
        };
        assert!(with("Sim").wants_refresh());
        assert!(with("true").wants_refresh());
        assert!(!with("0").wants_refresh());
        assert!(!with("false").wants_refresh());
        assert!(!with("").wants_refresh());
    }
}
