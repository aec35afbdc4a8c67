//! Application state shared across handlers.

use std::sync::Arc;

use crate::catalog::{ProductCatalog, RetryPolicy, SystemClock};
use crate::config::StorefrontConfig;
use crate::content::{ContentError, ContentStore};
use crate::lookup::{LookupClient, LookupError};
use crate::supabase::{SupabaseClient, SupabaseError};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid Supabase configuration: {0}")]
    Supabase(#[from] SupabaseError),
    #[error("invalid lookup configuration: {0}")]
    Lookup(#[from] LookupError),
    #[error("failed to load content: {0}")]
    Content(#[from] ContentError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    supabase: SupabaseClient,
    catalog: ProductCatalog,
    lookup: LookupClient,
    content: ContentStore,
}

impl AppState {
    /// Build clients, the product cache and the page store from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a client cannot be built from the configured URLs
    /// or the content directory cannot be read.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("agromaq-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let supabase = SupabaseClient::new(&config.supabase, http.clone())?;
        let lookup = LookupClient::new(&config.lookup, http)?;
        let catalog = ProductCatalog::new(
            supabase.clone(),
            config.catalog_cache_ttl,
            Arc::new(SystemClock),
            RetryPolicy::default(),
        );
        let content = ContentStore::load(&config.content_dir)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                supabase,
                catalog,
                lookup,
                content,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Remote store client (database, auth, storage).
    #[must_use]
    pub fn supabase(&self) -> &SupabaseClient {
        &self.inner.supabase
    }

    /// Cached product lists.
    #[must_use]
    pub fn catalog(&self) -> &ProductCatalog {
        &self.inner.catalog
    }

    #[must_use]
    pub fn lookup(&self) -> &LookupClient {
        &self.inner.lookup
    }

    #[must_use]
    pub fn content(&self) -> &ContentStore {
        &self.inner.content
    }
}
