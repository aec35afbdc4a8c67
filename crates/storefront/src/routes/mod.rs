//! HTTP route handlers for the storefront.
//!
//! Every page answers with a JSON [`PageResponse`]: the page name, the
//! signed-in user (if any), pending notices and the page's own data.
//! Form posts answer with a `303` redirect and queue a notice, or with a
//! `422` carrying field errors.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                            - Recent listings
//! GET  /comprar                     - Listings for sale (?marca=&categoria=&localizacao=&preco_max=&atualizar=1)
//! GET  /alugar                      - Listings for rent (same filters)
//! GET  /produto/{id}                - Listing detail with gallery and seller
//!
//! # Comparison (session-backed, max 4)
//! GET  /comparar                    - Current comparison
//! POST /comparar                    - Add a listing
//! POST /comparar/remover            - Remove a listing
//! POST /comparar/limpar             - Clear the comparison
//!
//! # Listings (requires auth)
//! GET  /vender                      - Listing form metadata
//! POST /vender                      - Publish (multipart, up to 10 images)
//! GET  /meus-anuncios               - The user's listings
//! GET  /editar-anuncio/{id}         - Edit form
//! POST /editar-anuncio/{id}         - Save changes
//! POST /editar-anuncio/{id}/excluir - Delete
//!
//! # Auth
//! GET  /entrar                      - Login page (never redirected)
//! POST /entrar                      - Login action
//! GET  /entrar/cadastro             - Signup page
//! POST /entrar/cadastro             - Signup action
//! GET  /entrar/recuperar            - Password recovery page
//! POST /entrar/recuperar            - Send recovery email
//! GET  /entrar/nova-senha           - New password page (recovery link target)
//! POST /entrar/nova-senha           - Set new password
//! POST /sair                        - Logout
//!
//! # Profile (requires auth)
//! GET  /perfil                      - Profile form
//! POST /perfil                      - Save profile
//!
//! # Content
//! GET  /como-funciona, /sobre       - Markdown pages
//! GET  /contato                     - Contact details
//! POST /contato                     - Contact message
//!
//! # Lookup API
//! GET  /api/cep/{cep}
//! GET  /api/estados
//! GET  /api/estados/{uf}/municipios
//!
//! GET  /health, /health/ready
//! ```

pub mod auth;
pub mod compare;
pub mod contact;
pub mod home;
pub mod listings;
pub mod lookup;
pub mod pages;
pub mod products;
pub mod profile;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tower_sessions::Session;

use crate::error::AppError;
use crate::middleware::{
    api_rate_limiter, auth_gate, auth_rate_limiter, create_session_layer,
    rate_limit::RateLimitConfigError, request_id_middleware, security_headers_middleware,
};
use crate::models::{CurrentUser, Notice, UserSummary};
use crate::supabase::Query;
use crate::state::AppState;

/// Envelope shared by every page.
#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub page: &'static str,
    pub user: Option<UserSummary>,
    pub notices: Vec<Notice>,
    pub data: T,
}

/// Build a page payload, draining the session's pending notices into it.
pub async fn page<T: Serialize>(
    name: &'static str,
    session: &Session,
    user: Option<&CurrentUser>,
    data: T,
) -> Json<PageResponse<T>> {
    Json(PageResponse {
        page: name,
        user: user.map(CurrentUser::summary),
        notices: Notice::take_all(session).await,
        data,
    })
}

/// Queue a notice, logging instead of failing when the session is unavailable.
pub async fn notify(session: &Session, notice: Notice) {
    if let Err(e) = notice.push(session).await {
        tracing::warn!(error = %e, "Failed to queue notice");
    }
}

fn auth_routes() -> Result<Router<AppState>, RateLimitConfigError> {
    Ok(Router::new()
        .route("/entrar", get(auth::login_page).post(auth::login))
        .route(
            "/entrar/cadastro",
            get(auth::register_page).post(auth::register),
        )
        .route(
            "/entrar/recuperar",
            get(auth::recover_page).post(auth::recover),
        )
        .route(
            "/entrar/nova-senha",
            get(auth::reset_page).post(auth::reset),
        )
        .route_layer(auth_rate_limiter()?)
        .route("/sair", post(auth::logout)))
}

fn api_routes() -> Result<Router<AppState>, RateLimitConfigError> {
    Ok(Router::new()
        .route("/api/cep/{cep}", get(lookup::address))
        .route("/api/estados", get(lookup::states))
        .route("/api/estados/{uf}/municipios", get(lookup::municipalities))
        .route_layer(api_rate_limiter()?))
}

fn listing_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/vender",
            get(listings::new_listing)
                .post(listings::create)
                .layer(DefaultBodyLimit::max(listings::MAX_UPLOAD_BYTES)),
        )
        .route("/meus-anuncios", get(listings::mine))
        .route(
            "/editar-anuncio/{id}",
            get(listings::edit).post(listings::update),
        )
        .route("/editar-anuncio/{id}/excluir", post(listings::delete))
}

fn compare_routes() -> Router<AppState> {
    Router::new()
        .route("/comparar", get(compare::show).post(compare::add))
        .route("/comparar/remover", post(compare::remove))
        .route("/comparar/limpar", post(compare::clear))
}

/// All page and API routes, without the middleware stack.
///
/// # Errors
///
/// Returns an error if a rate limiter cannot be configured.
pub fn routes() -> Result<Router<AppState>, RateLimitConfigError> {
    Ok(Router::new()
        .route("/", get(home::index))
        .route("/comprar", get(products::buy))
        .route("/alugar", get(products::rent))
        .route("/produto/{id}", get(products::show))
        .route("/perfil", get(profile::show).post(profile::update))
        .route("/como-funciona", get(pages::how_it_works))
        .route("/sobre", get(pages::about))
        .route("/contato", get(contact::show).post(contact::submit))
        .merge(listing_routes())
        .merge(compare_routes())
        .merge(auth_routes()?)
        .merge(api_routes()?))
}

/// The complete application: routes, health checks and the middleware stack.
///
/// Sentry layers are added by the binary on top of this.
///
/// # Errors
///
/// Returns an error if a rate limiter cannot be configured.
pub fn app(state: AppState) -> Result<Router, RateLimitConfigError> {
    let session_layer = create_session_layer(state.config());

    Ok(Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes()?)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), auth_gate))
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state))
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 if the remote store cannot be queried.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    let check = Query::table("products").select("id").limit(1);
    match state
        .supabase()
        .select::<serde_json::Value>(&check, None)
        .await
    {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn not_found() -> AppError {
    AppError::NotFound("Página não encontrada.".to_string())
}
