//! Cached product listings.
//!
//! Lists are keyed by their normalized [`ProductFilters`]. A cached list is
//! served for [`StorefrontConfig::catalog_cache_ttl`] (30s by default);
//! after that the next read goes to the remote store, retrying transient
//! failures with exponential backoff. Writes elsewhere in the app call
//! [`ProductCatalog::invalidate_all`] so sellers see their own changes.
//!
//! Two concurrent misses for the same key both reach the remote store.
//! That duplicate is logged, not prevented.
//!
//! [`StorefrontConfig::catalog_cache_ttl`]: crate::config::StorefrontConfig

mod cache;
mod retry;

pub use cache::{Clock, SystemClock, TtlCache};
pub use retry::RetryPolicy;

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::instrument;

use agromaq_core::{Category, ListingType, Price, Product, UserId};

use crate::error::ErrorKind;
use crate::supabase::{Query, SupabaseClient, SupabaseError};

/// Filters accepted by product list queries. Empty strings mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ProductFilters {
    pub listing_type: Option<ListingType>,
    pub brand: Option<String>,
    pub category: Option<Category>,
    pub location: Option<String>,
    pub max_price: Option<Price>,
    pub owner: Option<UserId>,
}

impl ProductFilters {
    /// Listings of one type.
    #[must_use]
    pub fn of_type(listing_type: ListingType) -> Self {
        Self {
            listing_type: Some(listing_type),
            ..Self::default()
        }
    }

    /// Every listing owned by `owner`.
    #[must_use]
    pub fn owned_by(owner: UserId) -> Self {
        Self {
            owner: Some(owner),
            ..Self::default()
        }
    }

    /// Trim text filters and drop the empty ones, so equivalent filters share
    /// a cache entry.
    #[must_use]
    pub fn normalized(&self) -> Self {
        fn clean(value: Option<&String>) -> Option<String> {
            value
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        Self {
            listing_type: self.listing_type,
            brand: clean(self.brand.as_ref()),
            category: self.category,
            location: clean(self.location.as_ref()),
            max_price: self.max_price,
            owner: self.owner,
        }
    }

    /// The PostgREST query for these filters, newest first.
    #[must_use]
    pub fn to_query(&self) -> Query {
        let mut query = Query::table("products");
        if let Some(listing_type) = self.listing_type {
            query = query.eq("type", listing_type.as_str());
        }
        if let Some(brand) = &self.brand {
            query = query.eq("brand", brand);
        }
        if let Some(category) = self.category {
            query = query.eq("category", category.as_str());
        }
        if let Some(location) = &self.location {
            query = query.contains_ci("location", location);
        }
        if let Some(max_price) = self.max_price {
            query = query.lte("price", max_price.amount());
        }
        if let Some(owner) = self.owner {
            query = query.eq("user_id", owner);
        }
        query.order_desc("created_at")
    }
}

/// Where product lists come from.
pub trait ProductSource: Send + Sync {
    /// Every product matching `filters`, newest first.
    fn list_products(
        &self,
        filters: &ProductFilters,
    ) -> impl Future<Output = Result<Vec<Product>, SupabaseError>> + Send;
}

impl ProductSource for SupabaseClient {
    async fn list_products(&self, filters: &ProductFilters) -> Result<Vec<Product>, SupabaseError> {
        self.select(&filters.to_query(), None).await
    }
}

/// A product list as handed to pages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductListState {
    pub products: Vec<Product>,
    /// Another fetch for the same filters is still running.
    pub loading: bool,
    /// User-facing message when the list could not be loaded.
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub from_cache: bool,
}

/// Product lists with a freshness window.
pub struct ProductCatalog<S = SupabaseClient> {
    source: S,
    cache: TtlCache<ProductFilters, Vec<Product>>,
    retry: RetryPolicy,
    in_flight: Mutex<HashSet<ProductFilters>>,
}

impl<S: ProductSource> ProductCatalog<S> {
    /// Create a catalog over `source`.
    pub fn new(source: S, ttl: Duration, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            source,
            cache: TtlCache::new(ttl, clock),
            retry,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Products matching `filters`, from cache while fresh.
    #[instrument(skip(self))]
    pub async fn fetch(&self, filters: &ProductFilters) -> ProductListState {
        let key = filters.normalized();
        if let Some(products) = self.cache.get(&key) {
            tracing::debug!(count = products.len(), "Product list cache hit");
            return ProductListState {
                products,
                loading: self.is_loading(&key),
                error: None,
                error_kind: None,
                from_cache: true,
            };
        }
        self.load(key).await
    }

    /// Products matching `filters`, always from the remote store.
    #[instrument(skip(self))]
    pub async fn refetch(&self, filters: &ProductFilters) -> ProductListState {
        let key = filters.normalized();
        self.cache.invalidate(&key);
        self.load(key).await
    }

    /// Whether a remote fetch for `filters` is running right now.
    #[must_use]
    pub fn is_loading(&self, filters: &ProductFilters) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&filters.normalized())
    }

    /// Forget one cached list.
    pub fn invalidate(&self, filters: &ProductFilters) {
        self.cache.invalidate(&filters.normalized());
    }

    /// Forget every cached list. Called after any listing is written.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    async fn load(&self, key: ProductFilters) -> ProductListState {
        let result = {
            let _guard = InFlight::enter(&self.in_flight, &key);
            let source = &self.source;
            let filters = &key;
            self.retry
                .run(move || source.list_products(filters))
                .await
        };

        match result {
            Ok(products) => {
                tracing::debug!(count = products.len(), "Product list loaded");
                self.cache.insert(key.clone(), products.clone());
                ProductListState {
                    products,
                    loading: self.is_loading(&key),
                    error: None,
                    error_kind: None,
                    from_cache: false,
                }
            }
            Err(err) => {
                let kind = err.kind();
                tracing::warn!(error = %err, kind = ?kind, "Failed to load product list");
                ProductListState {
                    products: Vec::new(),
                    loading: self.is_loading(&key),
                    error: Some(kind.user_message().to_string()),
                    error_kind: Some(kind),
                    from_cache: false,
                }
            }
        }
    }
}

/// Marks a key as being fetched for the guard's lifetime.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<ProductFilters>>,
    key: ProductFilters,
    owner: bool,
}

impl<'a> InFlight<'a> {
    fn enter(set: &'a Mutex<HashSet<ProductFilters>>, key: &ProductFilters) -> Self {
        let owner = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        if !owner {
            tracing::debug!(filters = ?key, "Duplicate product list fetch in flight");
        }
        Self {
            set,
            key: key.clone(),
            owner,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.owner {
            self.set
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.key);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use reqwest::StatusCode;
    use rust_decimal::Decimal;

    use agromaq_core::ProductId;

    use super::cache::ManualClock;
    use super::*;

    /// Serves canned products and counts calls. Fails the first
    /// `failures` calls with a network error.
    struct FakeSource {
        products: Vec<Product>,
        calls: AtomicUsize,
        failures: usize,
    }

    impl FakeSource {
        fn new(products: Vec<Product>) -> Self {
            Self {
                products,
                calls: AtomicUsize::new(0),
                failures: 0,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProductSource for FakeSource {
        async fn list_products(
            &self,
            filters: &ProductFilters,
        ) -> Result<Vec<Product>, SupabaseError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(SupabaseError::from_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Failed to fetch",
                ));
            }
            Ok(self
                .products
                .iter()
                .filter(|p| filters.listing_type.is_none_or(|t| p.listing_type == t))
                .cloned()
                .collect())
        }
    }

    fn product(title: &str, listing_type: ListingType) -> Product {
        Product {
            id: ProductId::generate(),
            title: title.to_string(),
            description: None,
            price: Price::new(Decimal::new(150_000, 0)),
            listing_type,
            rental_period: None,
            brand: Some("Massey Ferguson".to_string()),
            model: None,
            year: Some(2018),
            category: Category::Tractors,
            location: Some("Rio Verde - GO".to_string()),
            image_url: None,
            user_id: UserId::generate(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            hours: None,
            power: None,
            implement_type: None,
            work_width: None,
            part_type: None,
            part_condition: None,
            part_number: None,
        }
    }

    fn catalog(source: FakeSource) -> (ProductCatalog<FakeSource>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let catalog = ProductCatalog::new(
            source,
            Duration::from_secs(30),
            Arc::clone(&clock) as Arc<dyn Clock>,
            RetryPolicy::immediate(3),
        );
        (catalog, clock)
    }

    #[tokio::test]
    async fn test_second_fetch_within_ttl_is_served_from_cache() {
        let (catalog, clock) = catalog(FakeSource::new(vec![product("MF 4292", ListingType::Sale)]));
        let filters = ProductFilters::of_type(ListingType::Sale);

        let first = catalog.fetch(&filters).await;
        clock.advance(Duration::from_secs(10));
        let second = catalog.fetch(&filters).await;

        assert_eq!(catalog.source.calls(), 1);
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.products, second.products);
    }

    #[tokio::test]
    async fn test_fetch_after_ttl_goes_remote() {
        let (catalog, clock) = catalog(FakeSource::new(vec![product("MF 4292", ListingType::Sale)]));
        let filters = ProductFilters::default();

        catalog.fetch(&filters).await;
        clock.advance(Duration::from_secs(31));
        let state = catalog.fetch(&filters).await;

        assert_eq!(catalog.source.calls(), 2);
        assert!(!state.from_cache);
    }

    #[tokio::test]
    async fn test_refetch_bypasses_cache() {
        let (catalog, _clock) = catalog(FakeSource::new(vec![]));
        let filters = ProductFilters::default();

        catalog.fetch(&filters).await;
        catalog.refetch(&filters).await;
        assert_eq!(catalog.source.calls(), 2);
    }

    #[tokio::test]
    async fn test_equivalent_filters_share_entry() {
        let (catalog, _clock) = catalog(FakeSource::new(vec![]));
        let a = ProductFilters {
            brand: Some(" Valtra ".to_string()),
            location: Some(String::new()),
            ..ProductFilters::default()
        };
        let b = ProductFilters {
            brand: Some("Valtra".to_string()),
            ..ProductFilters::default()
        };

        catalog.fetch(&a).await;
        let state = catalog.fetch(&b).await;
        assert!(state.from_cache);
        assert_eq!(catalog.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mut source = FakeSource::new(vec![product("Plantadeira", ListingType::Rental)]);
        source.failures = 2;
        let (catalog, _clock) = catalog(source);

        let state = catalog.fetch(&ProductFilters::default()).await;
        assert_eq!(catalog.source.calls(), 3);
        assert!(state.error.is_none());
        assert_eq!(state.products.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_connection_error() {
        let mut source = FakeSource::new(vec![]);
        source.failures = 10;
        let (catalog, _clock) = catalog(source);

        let state = catalog.fetch(&ProductFilters::default()).await;
        assert_eq!(catalog.source.calls(), 3);
        assert_eq!(state.error_kind, Some(ErrorKind::Network));
        assert_eq!(
            state.error.as_deref(),
            Some(ErrorKind::Network.user_message())
        );
        assert!(state.products.is_empty());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let mut source = FakeSource::new(vec![]);
        source.failures = 3;
        let (catalog, _clock) = catalog(source);
        let filters = ProductFilters::default();

        let failed = catalog.fetch(&filters).await;
        let recovered = catalog.fetch(&filters).await;
        assert!(failed.error.is_some());
        assert!(recovered.error.is_none());
        assert!(!recovered.from_cache);
    }

    #[tokio::test]
    async fn test_invalidate_all_forces_reload() {
        let (catalog, _clock) = catalog(FakeSource::new(vec![]));
        let filters = ProductFilters::default();

        catalog.fetch(&filters).await;
        catalog.invalidate_all();
        catalog.fetch(&filters).await;
        assert_eq!(catalog.source.calls(), 2);
    }

    #[test]
    fn test_filters_to_query() {
        let filters = ProductFilters {
            listing_type: Some(ListingType::Rental),
            brand: Some("New Holland".to_string()),
            category: Some(Category::Harvesters),
            location: Some("MT".to_string()),
            max_price: Some(Price::new(Decimal::new(2000, 0))),
            owner: None,
        };
        let pairs = filters.to_query().pairs();
        let rendered: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();

        assert_eq!(
            rendered,
            vec![
                "select=*",
                "type=eq.aluguel",
                "brand=eq.New Holland",
                "category=eq.colheitadeiras",
                "location=ilike.*MT*",
                "price=lte.2000",
                "order=created_at.desc",
            ]
        );
    }
}
