//! Seller pages: publish, list, edit and delete listings.
//!
//! All of these sit behind the auth gate. Every confirmed write clears the
//! product-list cache so the seller's next page shows the change.

use axum::{
    Form, Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use agromaq_core::{ListingType, ProductId, RentalPeriod};

use crate::catalog::{ProductFilters, ProductListState};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::listing::{self, ImageBatch, IncomingImage, ListingForm, MAX_IMAGES, image_urls};
use crate::middleware::RequireAuth;
use crate::models::{CurrentUser, Notice};
use crate::state::AppState;

use super::products::{CategoryOption, category_options};
use super::{PageResponse, notify, page};

/// Request body limit for the listing form (ten photos straight from a phone).
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Multipart field carrying image files.
const IMAGE_FIELD: &str = "imagens";
/// Multipart field with the index of the image chosen as primary.
const PRIMARY_FIELD: &str = "principal";

#[derive(Debug, Serialize)]
pub struct ChoiceOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// Choices shared by the create and edit forms.
#[derive(Debug, Serialize)]
pub struct FormOptions {
    pub categories: Vec<CategoryOption>,
    pub listing_types: Vec<ChoiceOption>,
    pub rental_periods: Vec<ChoiceOption>,
    pub max_images: usize,
}

impl FormOptions {
    fn new() -> Self {
        Self {
            categories: category_options(),
            listing_types: vec![
                ChoiceOption {
                    value: ListingType::Sale.as_str(),
                    label: "Venda",
                },
                ChoiceOption {
                    value: ListingType::Rental.as_str(),
                    label: "Aluguel",
                },
            ],
            rental_periods: [RentalPeriod::Daily, RentalPeriod::Weekly, RentalPeriod::Monthly]
                .into_iter()
                .map(|p| ChoiceOption {
                    value: p.as_str(),
                    label: p.label(),
                })
                .collect(),
            max_images: MAX_IMAGES,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NewListingPage {
    pub form: ListingForm,
    pub options: FormOptions,
}

#[derive(Debug, Serialize)]
pub struct MyListingsPage {
    pub listings: ProductListState,
}

#[derive(Debug, Serialize)]
pub struct EditListingPage {
    pub product_id: ProductId,
    pub form: ListingForm,
    pub images: Vec<String>,
    pub options: FormOptions,
}

/// A parsed listing submission.
#[derive(Debug, Default)]
struct Submission {
    form: ListingForm,
    files: Vec<IncomingImage>,
    primary: Option<usize>,
}

fn bad_multipart(e: MultipartError) -> AppError {
    AppError::BadRequest(format!("Formulário inválido: {e}"))
}

async fn read_submission(mut multipart: Multipart) -> Result<Submission> {
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            IMAGE_FIELD => {
                let file_name = field.file_name().unwrap_or("imagem").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                // An untouched file input still posts an empty part
                if bytes.is_empty() {
                    continue;
                }
                submission.files.push(IncomingImage {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            PRIMARY_FIELD => {
                let text = field.text().await.map_err(bad_multipart)?;
                submission.primary = text.trim().parse().ok();
            }
            _ => {
                let text = field.text().await.map_err(bad_multipart)?;
                if !submission.form.set(&name, text) {
                    tracing::debug!(field = %name, "Ignoring unknown listing field");
                }
            }
        }
    }

    Ok(submission)
}

/// Put the file chosen as primary first, keeping the others in order.
fn primary_first(mut files: Vec<IncomingImage>, primary: Option<usize>) -> Vec<IncomingImage> {
    if let Some(index) = primary.filter(|&i| i > 0 && i < files.len()) {
        let chosen = files.remove(index);
        files.insert(0, chosen);
    }
    files
}

async fn my_listings_state(state: &AppState, user: &CurrentUser) -> ProductListState {
    state
        .catalog()
        .fetch(&ProductFilters::owned_by(user.id))
        .await
}

/// Empty listing form, with the seller's city as the default location.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn new_listing(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Json<PageResponse<NewListingPage>> {
    let location = match state
        .supabase()
        .get_profile(user.id, Some(&user.access_token))
        .await
    {
        Ok(profile) => profile.and_then(|p| p.location_label()),
        Err(e) => {
            tracing::warn!(error = %e, "Could not prefill location from profile");
            None
        }
    };

    let form = ListingForm {
        listing_type: ListingType::Sale.as_str().to_string(),
        location: location.unwrap_or_default(),
        ..ListingForm::default()
    };
    let data = NewListingPage {
        form,
        options: FormOptions::new(),
    };
    page("vender", &session, Some(&user), data).await
}

/// Publish a listing from the multipart form.
///
/// Images are compressed, then uploaded one at a time in order; the first
/// becomes the primary image. Files past the limit or that fail to
/// compress are skipped and reported in a warning notice.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    multipart: Multipart,
) -> Result<Response> {
    let submission = read_submission(multipart).await?;
    let draft = submission.form.validate().map_err(AppError::Validation)?;

    let mut batch = ImageBatch::default();
    let report = batch
        .accept(primary_first(submission.files, submission.primary))
        .await;

    let product = listing::publish(state.supabase(), user.id, &user.access_token, draft, batch).await?;
    state.catalog().invalidate_all();

    let product_id = product.id.to_string();
    add_breadcrumb("listing", "Published listing", Some(&[("product_id", product_id.as_str())]));
    if let Some(warning) = report.warning() {
        notify(&session, Notice::warning(warning)).await;
    }
    notify(&session, Notice::success("Anúncio publicado com sucesso!")).await;

    Ok(Redirect::to(&format!("/produto/{product_id}")).into_response())
}

/// The signed-in seller's listings, newest first.
pub async fn mine(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Json<PageResponse<MyListingsPage>> {
    let listings = my_listings_state(&state, &user).await;
    page("meus-anuncios", &session, Some(&user), MyListingsPage { listings }).await
}

/// Edit form for one of the seller's listings.
#[instrument(skip_all, fields(product_id = %id))]
pub async fn edit(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProductId>,
) -> Result<Json<PageResponse<EditListingPage>>> {
    let product = listing::load_owned(state.supabase(), id, user.id).await?;
    let gallery = state
        .supabase()
        .get_product_images(id)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not load gallery for edit form");
            Vec::new()
        });

    let data = EditListingPage {
        product_id: id,
        form: ListingForm::from_product(&product),
        images: image_urls(&product, &gallery),
        options: FormOptions::new(),
    };
    Ok(page("editar-anuncio", &session, Some(&user), data).await)
}

/// Save changes to a listing. Images are not edited here.
#[instrument(skip_all, fields(product_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProductId>,
    Form(form): Form<ListingForm>,
) -> Result<Redirect> {
    let draft = form.validate().map_err(AppError::Validation)?;
    listing::update(state.supabase(), id, user.id, &user.access_token, draft).await?;
    state.catalog().invalidate_all();

    notify(&session, Notice::success("Anúncio atualizado.")).await;
    Ok(Redirect::to(&format!("/produto/{id}")))
}

/// Delete a listing and answer with the refreshed "my listings" page.
#[instrument(skip_all, fields(product_id = %id))]
pub async fn delete(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProductId>,
) -> Result<Json<PageResponse<MyListingsPage>>> {
    listing::delete(state.supabase(), id, user.id, &user.access_token).await?;
    state.catalog().invalidate_all();
    add_breadcrumb("listing", "Deleted listing", None);

    notify(&session, Notice::success("Anúncio excluído.")).await;
    let listings = my_listings_state(&state, &user).await;
    Ok(page("meus-anuncios", &session, Some(&user), MyListingsPage { listings }).await)
}
