//! PostgREST table access.

use core::fmt::Display;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::{AccessToken, SupabaseClient, SupabaseError};

/// Media type that makes PostgREST return one object instead of an array.
/// Zero or several matching rows produce a 406 with code `PGRST116`.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// A PostgREST query: table, projection, horizontal filters and ordering.
///
/// Filters are rendered as `column=operator.value` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: &'static str,
    select: String,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<usize>,
}

impl Query {
    /// Select every column of `table`.
    #[must_use]
    pub fn table(table: &'static str) -> Self {
        Self {
            table,
            select: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Restrict the projection.
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        columns.clone_into(&mut self.select);
        self
    }

    /// `column = value`
    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("eq.{value}")));
        self
    }

    /// `column <= value`
    #[must_use]
    pub fn lte(mut self, column: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("lte.{value}")));
        self
    }

    /// Case-insensitive substring match. Wildcards typed by the user are
    /// dropped so they cannot widen the pattern.
    #[must_use]
    pub fn contains_ci(mut self, column: &str, needle: &str) -> Self {
        let cleaned: String = needle.chars().filter(|c| !matches!(c, '*' | '%')).collect();
        self.filters
            .push((column.to_string(), format!("ilike.*{}*", cleaned.trim())));
        self
    }

    /// Newest first by `column`.
    #[must_use]
    pub fn order_desc(mut self, column: &str) -> Self {
        self.order = Some(format!("{column}.desc"));
        self
    }

    /// Oldest/lowest first by `column`.
    #[must_use]
    pub fn order_asc(mut self, column: &str) -> Self {
        self.order = Some(format!("{column}.asc"));
        self
    }

    /// Cap the number of rows returned.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Target table.
    #[must_use]
    pub const fn table_name(&self) -> &'static str {
        self.table
    }

    /// Query-string pairs in the order PostgREST receives them.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.select.clone())];
        pairs.extend(self.filters.iter().cloned());
        if let Some(order) = &self.order {
            pairs.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }

    /// Pairs for writes, which take filters but no projection or paging.
    fn filter_pairs(&self) -> &[(String, String)] {
        &self.filters
    }
}

impl SupabaseClient {
    fn table_url(
        &self,
        table: &str,
        pairs: &[(String, String)],
    ) -> Result<url::Url, SupabaseError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        if !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Run a query and return every matching row.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or rows do not deserialize.
    #[instrument(skip(self, query, token), fields(table = query.table_name()))]
    pub async fn select<T: DeserializeOwned>(
        &self,
        query: &Query,
        token: Option<&AccessToken>,
    ) -> Result<Vec<T>, SupabaseError> {
        let url = self.table_url(query.table_name(), &query.pairs())?;
        let request = self.authorize(self.inner.http.get(url), token);
        let body = Self::send(request).await?;
        Self::parse(&body)
    }

    /// Run a query that must match exactly one row.
    ///
    /// # Errors
    ///
    /// Returns an error whose kind is `NotFound` when no row matches.
    #[instrument(skip(self, query, token), fields(table = query.table_name()))]
    pub async fn select_single<T: DeserializeOwned>(
        &self,
        query: &Query,
        token: Option<&AccessToken>,
    ) -> Result<T, SupabaseError> {
        let url = self.table_url(query.table_name(), &query.pairs())?;
        let request = self
            .authorize(self.inner.http.get(url), token)
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT);
        let body = Self::send(request).await?;
        Self::parse(&body)
    }

    /// Like [`select_single`](Self::select_single) but maps "no row" to `None`.
    ///
    /// # Errors
    ///
    /// Returns every error other than a missing row.
    pub async fn select_optional<T: DeserializeOwned>(
        &self,
        query: &Query,
        token: Option<&AccessToken>,
    ) -> Result<Option<T>, SupabaseError> {
        match self.select_single(query, token).await {
            Ok(row) => Ok(Some(row)),
            Err(err) if err.kind() == crate::error::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Insert rows and return them as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert is rejected.
    #[instrument(skip(self, rows, token))]
    pub async fn insert<B, T>(
        &self,
        table: &'static str,
        rows: &B,
        token: Option<&AccessToken>,
    ) -> Result<Vec<T>, SupabaseError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.table_url(table, &[])?;
        let request = self
            .authorize(self.inner.http.post(url), token)
            .header("Prefer", "return=representation")
            .json(rows);
        let body = Self::send(request).await?;
        Self::parse(&body)
    }

    /// Insert or update by primary key and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected.
    #[instrument(skip(self, row, token))]
    pub async fn upsert<B, T>(
        &self,
        table: &'static str,
        row: &B,
        token: Option<&AccessToken>,
    ) -> Result<T, SupabaseError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.table_url(table, &[])?;
        let request = self
            .authorize(self.inner.http.post(url), token)
            .header(
                "Prefer",
                "resolution=merge-duplicates,return=representation",
            )
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .json(row);
        let body = Self::send(request).await?;
        Self::parse(&body)
    }

    /// Patch every row matching the query's filters and return them.
    ///
    /// # Errors
    ///
    /// Returns an error if the update is rejected.
    #[instrument(skip(self, query, patch, token), fields(table = query.table_name()))]
    pub async fn update<B, T>(
        &self,
        query: &Query,
        patch: &B,
        token: Option<&AccessToken>,
    ) -> Result<Vec<T>, SupabaseError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.table_url(query.table_name(), query.filter_pairs())?;
        let request = self
            .authorize(self.inner.http.patch(url), token)
            .header("Prefer", "return=representation")
            .json(patch);
        let body = Self::send(request).await?;
        Self::parse(&body)
    }

    /// Delete every row matching the query's filters and return how many
    /// were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete is rejected.
    #[instrument(skip(self, query, token), fields(table = query.table_name()))]
    pub async fn delete(
        &self,
        query: &Query,
        token: Option<&AccessToken>,
    ) -> Result<usize, SupabaseError> {
        let url = self.table_url(query.table_name(), query.filter_pairs())?;
        let request = self
            .authorize(self.inner.http.delete(url), token)
            .header("Prefer", "return=representation");
        let body = Self::send(request).await?;
        if body.trim().is_empty() {
            return Ok(0);
        }
        let rows: Vec<serde_json::Value> = Self::parse(&body)?;
        Ok(rows.len())
    }
}
