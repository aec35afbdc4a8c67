//! Typed operations on the marketplace tables.

use tracing::instrument;

use agromaq_core::{
    NewProduct, NewProductImage, Product, ProductId, ProductImage, ProductPatch, Profile,
    ProfileUpdate, UserId,
};

use super::{AccessToken, Query, SupabaseClient, SupabaseError};

const PRODUCTS: &str = "products";
const PRODUCT_IMAGES: &str = "product_images";
const PROFILES: &str = "profiles";

impl SupabaseClient {
    /// One listing by id.
    ///
    /// # Errors
    ///
    /// Returns an error whose kind is `NotFound` if the listing is gone.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, SupabaseError> {
        self.select_single(&Query::table(PRODUCTS).eq("id", id), None)
            .await
    }

    /// Gallery images of a listing beyond the primary one, in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product_images(
        &self,
        id: ProductId,
    ) -> Result<Vec<ProductImage>, SupabaseError> {
        self.select(
            &Query::table(PRODUCT_IMAGES)
                .eq("product_id", id)
                .order_asc("position"),
            None,
        )
        .await
    }

    /// Insert a listing row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert is rejected.
    #[instrument(skip(self, product, token), fields(product_id = %product.id))]
    pub async fn insert_product(
        &self,
        product: &NewProduct,
        token: &AccessToken,
    ) -> Result<Product, SupabaseError> {
        let mut rows: Vec<Product> = self.insert(PRODUCTS, product, Some(token)).await?;
        rows.pop().ok_or_else(|| SupabaseError::Api {
            status: 200,
            code: None,
            message: "insert returned no row".to_string(),
        })
    }

    /// Insert gallery rows for a listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert is rejected.
    #[instrument(skip(self, images, token), fields(count = images.len()))]
    pub async fn insert_product_images(
        &self,
        images: &[NewProductImage],
        token: &AccessToken,
    ) -> Result<Vec<ProductImage>, SupabaseError> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        self.insert(PRODUCT_IMAGES, images, Some(token)).await
    }

    /// Update a listing owned by `owner`. Rows owned by anyone else are left
    /// untouched and `NotFound` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error whose kind is `NotFound` if nothing matched.
    #[instrument(skip(self, patch, token), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        owner: UserId,
        patch: &ProductPatch,
        token: &AccessToken,
    ) -> Result<Product, SupabaseError> {
        let query = Query::table(PRODUCTS).eq("id", id).eq("user_id", owner);
        let mut rows: Vec<Product> = self.update(&query, patch, Some(token)).await?;
        rows.pop().ok_or_else(|| SupabaseError::Api {
            status: 406,
            code: Some("PGRST116".to_string()),
            message: "no listing matched".to_string(),
        })
    }

    /// Delete a listing owned by `owner`, then its gallery rows.
    ///
    /// The listing row goes first so that a rejected delete leaves the
    /// listing whole. Gallery rows normally go with it through the foreign
    /// key; the second delete only sweeps up what is left.
    ///
    /// # Errors
    ///
    /// Returns an error whose kind is `NotFound` if no listing of `owner`
    /// matched, or any error from the listing delete.
    #[instrument(skip(self, token), fields(product_id = %id))]
    pub async fn delete_product(
        &self,
        id: ProductId,
        owner: UserId,
        token: &AccessToken,
    ) -> Result<(), SupabaseError> {
        let removed = self
            .delete(
                &Query::table(PRODUCTS).eq("id", id).eq("user_id", owner),
                Some(token),
            )
            .await?;
        if removed == 0 {
            return Err(SupabaseError::Api {
                status: 406,
                code: Some("PGRST116".to_string()),
                message: "no listing matched".to_string(),
            });
        }

        if let Err(e) = self
            .delete(
                &Query::table(PRODUCT_IMAGES).eq("product_id", id),
                Some(token),
            )
            .await
        {
            tracing::warn!(error = %e, "Gallery rows left after listing delete");
        }
        Ok(())
    }

    /// A user's profile, if the row exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token), fields(user_id = %id))]
    pub async fn get_profile(
        &self,
        id: UserId,
        token: Option<&AccessToken>,
    ) -> Result<Option<Profile>, SupabaseError> {
        self.select_optional(&Query::table(PROFILES).eq("id", id), token)
            .await
    }

    /// Create or update the caller's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected.
    #[instrument(skip(self, update, token), fields(user_id = %update.id))]
    pub async fn upsert_profile(
        &self,
        update: &ProfileUpdate,
        token: &AccessToken,
    ) -> Result<Profile, SupabaseError> {
        self.upsert(PROFILES, update, Some(token)).await
    }
}
