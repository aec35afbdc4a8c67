//! Publishing, editing and deleting listings.
//!
//! Publishing uploads the prepared images one at a time, in batch order,
//! then writes the listing row and its gallery rows. Nothing is written to
//! the tables until every upload has succeeded. When a later step fails,
//! the objects already uploaded for this listing are deleted again on a
//! best-effort basis.

pub mod draft;
pub mod images;

pub use draft::{ListingDraft, ListingForm};
pub use images::{AcceptReport, CompressionSettings, ImageBatch, IncomingImage, MAX_IMAGES};

use tracing::instrument;

use agromaq_core::{NewProductImage, Product, ProductId, ProductImage, UserId};

use crate::error::{AppError, Result};
use crate::supabase::{AccessToken, StoredObject, SupabaseClient};

/// Storage path for the `index`-th image of a listing.
#[must_use]
pub fn object_path(owner: UserId, product_id: ProductId, index: usize) -> String {
    format!("{owner}/{product_id}/{index}.jpg")
}

/// Gallery rows for every uploaded image after the primary one.
#[must_use]
pub fn gallery_rows(product_id: ProductId, uploaded: &[StoredObject]) -> Vec<NewProductImage> {
    uploaded
        .iter()
        .enumerate()
        .skip(1)
        .map(|(index, object)| NewProductImage {
            product_id,
            image_url: object.public_url.clone(),
            position: i32::try_from(index).unwrap_or(i32::MAX),
        })
        .collect()
}

/// Every image URL of a listing: primary first, then the gallery in order.
#[must_use]
pub fn image_urls(product: &Product, gallery: &[ProductImage]) -> Vec<String> {
    let mut sorted: Vec<&ProductImage> = gallery.iter().collect();
    sorted.sort_by_key(|image| image.position);

    product
        .image_url
        .iter()
        .cloned()
        .chain(sorted.into_iter().map(|image| image.image_url.clone()))
        .collect()
}

/// Upload images and create the listing.
///
/// # Errors
///
/// Returns the first upload or insert failure, after cleaning up.
#[instrument(skip(client, draft, batch, token), fields(images = batch.len()))]
pub async fn publish(
    client: &SupabaseClient,
    owner: UserId,
    token: &AccessToken,
    draft: ListingDraft,
    batch: ImageBatch,
) -> Result<Product> {
    let product_id = ProductId::generate();
    let mut uploaded: Vec<StoredObject> = Vec::with_capacity(batch.len());

    for (index, image) in batch.into_images().into_iter().enumerate() {
        let path = object_path(owner, product_id, index);
        match client
            .upload_object(&path, image.jpeg, "image/jpeg", token)
            .await
        {
            Ok(object) => uploaded.push(object),
            Err(err) => {
                tracing::warn!(index, error = %err, "Image upload failed, aborting listing");
                discard_uploads(client, &uploaded, token).await;
                return Err(err.into());
            }
        }
    }

    let primary = uploaded.first().map(|object| object.public_url.clone());
    let new_product = draft.into_new_product(product_id, owner, primary);
    let product = match client.insert_product(&new_product, token).await {
        Ok(product) => product,
        Err(err) => {
            discard_uploads(client, &uploaded, token).await;
            return Err(err.into());
        }
    };

    if let Err(err) = client
        .insert_product_images(&gallery_rows(product_id, &uploaded), token)
        .await
    {
        if let Err(cleanup) = client.delete_product(product_id, owner, token).await {
            tracing::warn!(error = %cleanup, product_id = %product_id, "Could not roll back listing row");
        }
        discard_uploads(client, &uploaded, token).await;
        return Err(err.into());
    }

    tracing::info!(product_id = %product_id, images = uploaded.len(), "Listing published");
    Ok(product)
}

/// Load a listing for editing, checking ownership.
///
/// # Errors
///
/// Returns `NotFound` for missing listings and `Forbidden` for listings
/// owned by someone else.
pub async fn load_owned(client: &SupabaseClient, id: ProductId, owner: UserId) -> Result<Product> {
    let product = client.get_product(id).await?;
    if !product.is_owned_by(owner) {
        return Err(AppError::Forbidden(
            "Você só pode alterar os seus próprios anúncios.".to_string(),
        ));
    }
    Ok(product)
}

/// Save edits to an owned listing.
///
/// # Errors
///
/// Returns an error if the listing is not the caller's or the update fails.
#[instrument(skip(client, token, draft), fields(product_id = %id))]
pub async fn update(
    client: &SupabaseClient,
    id: ProductId,
    owner: UserId,
    token: &AccessToken,
    draft: ListingDraft,
) -> Result<Product> {
    load_owned(client, id, owner).await?;
    let patch = draft.into_patch(chrono::Utc::now());
    Ok(client.update_product(id, owner, &patch, token).await?)
}

/// Delete an owned listing, its gallery rows and its stored images.
///
/// # Errors
///
/// Returns an error if the listing is not the caller's or the row delete
/// fails. Storage cleanup failures are only logged.
#[instrument(skip(client, token), fields(product_id = %id))]
pub async fn delete(
    client: &SupabaseClient,
    id: ProductId,
    owner: UserId,
    token: &AccessToken,
) -> Result<()> {
    let product = load_owned(client, id, owner).await?;
    let gallery = client.get_product_images(id).await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not list gallery before delete");
        Vec::new()
    });

    client.delete_product(id, owner, token).await?;

    let paths: Vec<String> = image_urls(&product, &gallery)
        .iter()
        .filter_map(|url| client.object_path(url))
        .collect();
    if let Err(e) = client.remove_objects(&paths, token).await {
        tracing::warn!(error = %e, count = paths.len(), "Listing images left in storage");
    }

    tracing::info!("Listing deleted");
    Ok(())
}

async fn discard_uploads(client: &SupabaseClient, uploaded: &[StoredObject], token: &AccessToken) {
    if uploaded.is_empty() {
        return;
    }
    let paths: Vec<String> = uploaded.iter().map(|o| o.path.clone()).collect();
    if let Err(e) = client.remove_objects(&paths, token).await {
        tracing::warn!(error = %e, count = paths.len(), "Orphaned listing images left in storage");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use agromaq_core::{Category, ListingType, Price, ProductImageId};

    use super::*;

    fn stored(path: &str) -> StoredObject {
        StoredObject {
            path: path.to_string(),
            public_url: format!("https://cdn.test/{path}"),
        }
    }

    #[test]
    fn test_object_path_layout() {
        let owner = UserId::generate();
        let product = ProductId::generate();
        assert_eq!(
            object_path(owner, product, 3),
            format!("{owner}/{product}/3.jpg")
        );
    }

    #[test]
    fn test_gallery_rows_skip_primary() {
        let product_id = ProductId::generate();
        let uploaded = [stored("0.jpg"), stored("1.jpg"), stored("2.jpg")];

        let rows = gallery_rows(product_id, &uploaded);
        let positions: Vec<i32> = rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, [1, 2]);
        assert_eq!(
            rows.first().map(|r| r.image_url.as_str()),
            Some("https://cdn.test/1.jpg")
        );
        assert!(gallery_rows(product_id, &[stored("0.jpg")]).is_empty());
    }

    #[test]
    fn test_image_urls_orders_gallery() {
        let product = Product {
            id: ProductId::generate(),
            title: "Pulverizador".to_string(),
            description: None,
            price: Price::new(Decimal::new(90_000, 0)),
            listing_type: ListingType::Sale,
            rental_period: None,
            brand: None,
            model: None,
            year: None,
            category: Category::Implements,
            location: None,
            image_url: Some("p.jpg".to_string()),
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
        };
        let image = |url: &str, position| ProductImage {
            id: ProductImageId::generate(),
            product_id: product.id,
            image_url: url.to_string(),
            position,
        };

        let urls = image_urls(&product, &[image("c.jpg", 3), image("b.jpg", 1)]);
        assert_eq!(urls, ["p.jpg", "b.jpg", "c.jpg"]);
    }
}
