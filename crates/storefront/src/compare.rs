//! Side-by-side comparison list.
//!
//! Holds up to [`MAX_COMPARE_ITEMS`] product snapshots, persisted in the
//! visitor's session as a JSON string under
//! [`session_keys::COMPARE_LIST`](crate::models::session_keys::COMPARE_LIST).
//! Snapshots are not refreshed, so a compared listing shows the data it had
//! when it was added.

use serde::Serialize;
use tower_sessions::Session;

use agromaq_core::{Product, ProductId};

use crate::models::session_keys;

/// Maximum number of products in the comparison list.
pub const MAX_COMPARE_ITEMS: usize = 4;

/// Result of [`CompareList::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
    /// The list already holds [`MAX_COMPARE_ITEMS`]; nothing changed.
    Full,
}

impl AddOutcome {
    /// Notice shown after the add.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Added => "Máquina adicionada à comparação.",
            Self::AlreadyPresent => "Esta máquina já está na comparação.",
            Self::Full => "Você pode comparar no máximo 4 máquinas. Remova uma para adicionar outra.",
        }
    }
}

/// Ordered, duplicate-free list of product snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompareList {
    items: Vec<Product>,
}

impl CompareList {
    /// Rebuild from persisted JSON. Missing or malformed data yields an
    /// empty list; duplicates and anything past the limit are dropped.
    #[must_use]
    pub fn hydrate(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };

        let stored: Vec<Product> = match serde_json::from_str(raw) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed comparison list");
                return Self::default();
            }
        };

        let mut list = Self::default();
        for product in stored {
            if list.add(product) == AddOutcome::Full {
                break;
            }
        }
        list
    }

    /// Serialize for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if a snapshot cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.items)
    }

    /// Append `product` unless it is already present or the list is full.
    pub fn add(&mut self, product: Product) -> AddOutcome {
        if self.contains(product.id) {
            AddOutcome::AlreadyPresent
        } else if self.is_full() {
            AddOutcome::Full
        } else {
            self.items.push(product);
            AddOutcome::Added
        }
    }

    /// Remove by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|p| p.id != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn contains(&self, id: ProductId) -> bool {
        self.items.iter().any(|p| p.id == id)
    }

    #[must_use]
    pub fn items(&self) -> &[Product] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() >= MAX_COMPARE_ITEMS
    }
}

/// Load the visitor's comparison list. Session read failures are logged and
/// treated as an empty list.
pub async fn load(session: &Session) -> CompareList {
    match session.get::<String>(session_keys::COMPARE_LIST).await {
        Ok(raw) => CompareList::hydrate(raw.as_deref()),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read comparison list from session");
            CompareList::default()
        }
    }
}

/// Persist the comparison list. Called after every mutation; an empty list
/// removes the stored key.
///
/// # Errors
///
/// Returns an error if the session store rejects the write.
pub async fn save(session: &Session, list: &CompareList) -> crate::error::Result<()> {
    if list.is_empty() {
        session.remove::<String>(session_keys::COMPARE_LIST).await?;
        return Ok(());
    }
    let raw = list
        .to_json()
        .map_err(|e| crate::error::AppError::Internal(format!("serialize comparison list: {e}")))?;
    session.insert(session_keys::COMPARE_LIST, raw).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use tower_sessions::MemoryStore;

    use agromaq_core::{Category, ListingType, Price, UserId};

    use super::*;

    fn product(title: &str) -> Product {
        Product {
            id: ProductId::generate(),
            title: title.to_string(),
            description: None,
            price: Price::new(Decimal::new(320_000, 0)),
            listing_type: ListingType::Sale,
            rental_period: None,
            brand: Some("John Deere".to_string()),
            model: Some("S540".to_string()),
            year: Some(2016),
            category: Category::Harvesters,
            location: Some("Sorriso - MT".to_string()),
            image_url: None,
            user_id: UserId::generate(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            hours: Some(3100),
            power: None,
            implement_type: None,
            work_width: None,
            part_type: None,
            part_condition: None,
            part_number: None,
        }
    }

    #[test]
    fn test_fifth_add_is_refused() {
        let mut list = CompareList::default();
        for i in 0..MAX_COMPARE_ITEMS {
            assert_eq!(list.add(product(&format!("M{i}"))), AddOutcome::Added);
        }
        let before = list.clone();

        assert_eq!(list.add(product("Quinta")), AddOutcome::Full);
        assert_eq!(list, before);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let mut list = CompareList::default();
        let item = product("S540");
        list.add(item.clone());

        assert_eq!(list.add(item), AddOutcome::AlreadyPresent);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut list = CompareList::default();
        let a = product("A");
        let b = product("B");
        list.add(a.clone());
        list.add(b.clone());

        assert!(list.remove(a.id));
        assert!(!list.remove(a.id));
        assert!(list.contains(b.id));

        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn test_hydrate_round_trip_keeps_order() {
        let mut list = CompareList::default();
        list.add(product("A"));
        list.add(product("B"));
        let raw = list.to_json().unwrap();

        let restored = CompareList::hydrate(Some(&raw));
        assert_eq!(restored, list);
    }

    #[test]
    fn test_hydrate_malformed_yields_empty() {
        assert!(CompareList::hydrate(Some("{not json")).is_empty());
        assert!(CompareList::hydrate(Some("{\"a\":1}")).is_empty());
        assert!(CompareList::hydrate(None).is_empty());
    }

    #[test]
    fn test_hydrate_enforces_limit_and_uniqueness() {
        let repeated = product("Repetida");
        let mut stored = vec![repeated.clone(), repeated];
        stored.extend((0..5).map(|i| product(&format!("X{i}"))));
        let raw = serde_json::to_string(&stored).unwrap();

        let list = CompareList::hydrate(Some(&raw));
        assert_eq!(list.len(), MAX_COMPARE_ITEMS);
        let ids: std::collections::HashSet<_> = list.items().iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), MAX_COMPARE_ITEMS);
    }

    #[tokio::test]
    async fn test_session_persistence() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let mut list = load(&session).await;
        assert!(list.is_empty());

        let item = product("Persistida");
        list.add(item.clone());
        save(&session, &list).await.unwrap();

        let reloaded = load(&session).await;
        assert!(reloaded.contains(item.id));
    }

    #[tokio::test]
    async fn test_session_garbage_yields_empty() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        session
            .insert(session_keys::COMPARE_LIST, "[[[")
            .await
            .unwrap();
        assert!(load(&session).await.is_empty());
    }
}
