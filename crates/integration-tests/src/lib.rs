//! Integration test harness for the Agromaq marketplace server.
//!
//! Each test spawns a [`FakeBackend`] on a loopback port that answers the
//! PostgREST, GoTrue, storage and ViaCEP requests the server makes, then
//! drives the real router with `tower::ServiceExt::oneshot`. Nothing
//! outside the process is contacted.
//!
//! Writes reaching the backend are recorded in order as [`BackendCall`]s,
//! and a [`Fault`] makes one kind of request fail.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p agromaq-integration-tests
//! ```
//!
//! Rate-limited routes key on the client IP, so requests built with
//! [`get`] and [`post_form`] carry an `x-forwarded-for` header.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, Request, Response, StatusCode, header},
    response::IntoResponse,
    routing::{self, delete, post},
};
use http_body_util::BodyExt;
use image::{ImageFormat, RgbImage};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use agromaq_storefront::config::{ContactConfig, LookupConfig, StorefrontConfig, SupabaseConfig};
use agromaq_storefront::routes;
use agromaq_storefront::state::AppState;

/// Header PostgREST clients send to ask for a single object.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Owner of every fixture listing.
pub const SELLER_ID: &str = "0b7f4f2e-8d7c-4d0e-bb0e-6f2f2a1c9d33";

/// CEP the fake ViaCEP knows.
pub const KNOWN_CEP: &str = "38400100";

/// Storage bucket the server is configured with.
pub const BUCKET: &str = "product-images";

/// Email the fake GoTrue signs in.
pub const SELLER_EMAIL: &str = "ana@fazenda.com.br";

/// Password the fake GoTrue rejects.
pub const WRONG_PASSWORD: &str = "senha-errada";

/// Access token handed out by a refresh grant.
pub const REFRESHED_TOKEN: &str = "access-refreshed";

/// A write or auth request that reached the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// `grant_type` of a token request.
    Token(String),
    /// Object path of a storage upload.
    Upload(String),
    /// Object paths of a storage remove.
    RemoveObjects(Vec<String>),
    InsertProduct(Value),
    InsertImages(Vec<Value>),
    /// Table of a delete.
    Delete(&'static str),
    /// Bearer token of a profile read.
    ReadProfile(String),
}

/// A request kind the backend should reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    ProductInsert,
    ImageInsert,
    ProductDelete,
    Refresh,
}

#[derive(Clone, Default)]
struct Backend {
    products: Arc<Mutex<Vec<Value>>>,
    product_hits: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<BackendCall>>>,
    faults: Arc<Mutex<HashSet<Fault>>>,
    token_lifetime: Arc<AtomicI64>,
}

impl Backend {
    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn failing(&self, fault: Fault) -> bool {
        self.faults.lock().unwrap().contains(&fault)
    }
}

/// In-process stand-in for the remote store and the CEP service.
pub struct FakeBackend {
    pub base_url: String,
    backend: Backend,
}

impl FakeBackend {
    /// Start serving `products` as the `products` table.
    pub async fn spawn(products: Vec<Value>) -> Self {
        let backend = Backend {
            products: Arc::new(Mutex::new(products)),
            token_lifetime: Arc::new(AtomicI64::new(3600)),
            ..Backend::default()
        };

        let app = Router::new()
            .route(
                "/rest/v1/products",
                routing::get(products_table).post(insert_product).delete(delete_products),
            )
            .route(
                "/rest/v1/product_images",
                routing::get(|| async { Json(json!([])) })
                    .post(insert_images)
                    .delete(delete_images),
            )
            .route("/rest/v1/profiles", routing::get(seller_profile))
            .route("/auth/v1/token", post(token))
            .route("/storage/v1/object/{bucket}", delete(remove_objects))
            .route("/storage/v1/object/{bucket}/{*path}", post(upload))
            .route("/ws/{cep}/json/", routing::get(viacep))
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            backend,
        }
    }

    /// Reject every later request of this kind.
    pub fn inject(&self, fault: Fault) {
        self.backend.faults.lock().unwrap().insert(fault);
    }

    /// Lifetime in seconds of tokens from password sign-ins.
    pub fn set_token_lifetime(&self, seconds: i64) {
        self.backend.token_lifetime.store(seconds, Ordering::SeqCst);
    }

    /// Recorded calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.backend.calls.lock().unwrap().clone()
    }

    /// Rows currently in the `products` table.
    #[must_use]
    pub fn products(&self) -> Vec<Value> {
        self.backend.products.lock().unwrap().clone()
    }

    /// Public URL the server derives for an object path.
    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{BUCKET}/{path}", self.base_url)
    }

    /// How many requests reached the `products` table.
    #[must_use]
    pub fn product_hits(&self) -> usize {
        self.backend.product_hits.load(Ordering::SeqCst)
    }

    /// Server configuration pointing every upstream at this backend.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        StorefrontConfig {
            host: [127, 0, 0, 1].into(),
            port: 0,
            base_url: "http://127.0.0.1:3000".to_string(),
            content_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../storefront/content"),
            supabase: SupabaseConfig {
                url: self.base_url.clone(),
                anon_key: SecretString::from("k7Qp2vX9mL4tR8wZ1nB6cJ3hF5yD0sGa".to_string()),
                storage_bucket: BUCKET.to_string(),
            },
            lookup: LookupConfig {
                viacep_base_url: self.base_url.clone(),
                ibge_base_url: self.base_url.clone(),
            },
            contact: ContactConfig {
                email: Some("contato@agromaq.com.br".to_string()),
                whatsapp: None,
            },
            catalog_cache_ttl: Duration::from_secs(30),
            http_timeout: Duration::from_secs(5),
            sentry_dsn: None,
            sentry_environment: "test".to_string(),
        }
    }

    /// The full application router over this backend.
    #[must_use]
    pub fn app(&self) -> Router {
        let state = AppState::new(self.config()).unwrap();
        routes::app(state).unwrap()
    }
}

async fn products_table(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    backend.product_hits.fetch_add(1, Ordering::SeqCst);

    let wants_single = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(SINGLE_OBJECT));

    let matches = |row: &&Value| {
        params.iter().all(|(column, filter)| {
            let Some(expected) = filter.strip_prefix("eq.") else {
                return true;
            };
            row.get(column)
                .and_then(Value::as_str)
                .is_none_or(|actual| actual == expected)
        })
    };
    let rows: Vec<Value> = backend
        .products
        .lock()
        .unwrap()
        .iter()
        .filter(matches)
        .cloned()
        .collect();

    if !wants_single {
        return Json(rows).into_response();
    }
    match rows.as_slice() {
        [row] => Json(row.clone()).into_response(),
        _ => (
            StatusCode::NOT_ACCEPTABLE,
            Json(json!({
                "code": "PGRST116",
                "message": "JSON object requested, multiple (or no) rows returned",
                "details": "The result contains 0 rows",
                "hint": null
            })),
        )
            .into_response(),
    }
}

fn eq_filters(params: &HashMap<String, String>) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(column, filter)| {
            filter
                .strip_prefix("eq.")
                .map(|value| (column.clone(), value.to_string()))
        })
        .collect()
}

fn rejected() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "code": "XX000", "message": "database unavailable" })),
    )
        .into_response()
}

async fn insert_product(
    State(backend): State<Backend>,
    Json(row): Json<Value>,
) -> axum::response::Response {
    backend.record(BackendCall::InsertProduct(row.clone()));
    if backend.failing(Fault::ProductInsert) {
        return rejected();
    }

    let mut stored = row;
    stored["created_at"] = json!("2025-03-02T09:30:00Z");
    stored["updated_at"] = json!("2025-03-02T09:30:00Z");
    backend.products.lock().unwrap().push(stored.clone());
    (StatusCode::CREATED, Json(json!([stored]))).into_response()
}

async fn insert_images(
    State(backend): State<Backend>,
    Json(rows): Json<Vec<Value>>,
) -> axum::response::Response {
    backend.record(BackendCall::InsertImages(rows.clone()));
    if backend.failing(Fault::ImageInsert) {
        return rejected();
    }

    let stored: Vec<Value> = rows
        .into_iter()
        .map(|mut row| {
            row["id"] = json!(new_id());
            row
        })
        .collect();
    (StatusCode::CREATED, Json(stored)).into_response()
}

async fn delete_products(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    backend.record(BackendCall::Delete("products"));
    if backend.failing(Fault::ProductDelete) {
        return rejected();
    }

    let filters = eq_filters(&params);
    let removed: Vec<Value> = {
        let mut products = backend.products.lock().unwrap();
        let (removed, kept) = products.drain(..).partition(|row: &Value| {
            filters.iter().all(|(column, value)| {
                row.get(column).and_then(Value::as_str) == Some(value.as_str())
            })
        });
        *products = kept;
        removed
    };
    Json(removed).into_response()
}

async fn delete_images(State(backend): State<Backend>) -> Json<Value> {
    backend.record(BackendCall::Delete("product_images"));
    Json(json!([]))
}

async fn upload(
    State(backend): State<Backend>,
    Path((_bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    backend.record(BackendCall::Upload(path.clone()));
    let is_jpeg = headers
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v == "image/jpeg");
    if !is_jpeg || body.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": "bad upload" }))).into_response();
    }
    Json(json!({ "Key": format!("{BUCKET}/{path}") })).into_response()
}

async fn remove_objects(State(backend): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
    let paths: Vec<String> = body["prefixes"]
        .as_array()
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    backend.record(BackendCall::RemoveObjects(paths));
    Json(json!([]))
}

fn session_body(access_token: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": expires_in,
        "refresh_token": format!("refresh-{}", new_id()),
        "user": { "id": SELLER_ID, "email": SELLER_EMAIL, "role": "authenticated" }
    })
}

async fn token(
    State(backend): State<Backend>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let grant = params.get("grant_type").cloned().unwrap_or_default();
    backend.record(BackendCall::Token(grant.clone()));

    let invalid_grant = |description: &str| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": description })),
        )
            .into_response()
    };

    match grant.as_str() {
        "password" if body["password"] == WRONG_PASSWORD => {
            invalid_grant("Invalid login credentials")
        }
        "password" => {
            let lifetime = backend.token_lifetime.load(Ordering::SeqCst);
            Json(session_body("access-initial", lifetime)).into_response()
        }
        "refresh_token" if backend.failing(Fault::Refresh) => {
            invalid_grant("Invalid Refresh Token: Refresh Token Not Found")
        }
        "refresh_token" => Json(session_body(REFRESHED_TOKEN, 3600)).into_response(),
        _ => invalid_grant("unsupported grant type"),
    }
}

async fn seller_profile(State(backend): State<Backend>, headers: HeaderMap) -> Json<Value> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    backend.record(BackendCall::ReadProfile(bearer));

    Json(json!({
        "id": SELLER_ID,
        "full_name": "Fazenda Boa Vista",
        "phone": "(64) 99999-0000",
        "city": "Rio Verde",
        "state": "GO"
    }))
}

async fn viacep(Path(cep): Path<String>) -> Json<Value> {
    if cep == KNOWN_CEP {
        Json(json!({
            "cep": "38400-100",
            "logradouro": "Avenida Afonso Pena",
            "complemento": "",
            "bairro": "Centro",
            "localidade": "Uberlândia",
            "uf": "MG",
            "ibge": "3170206"
        }))
    } else {
        Json(json!({ "erro": true }))
    }
}

/// A `products` row as PostgREST would return it.
#[must_use]
pub fn product_row(id: &str, title: &str, listing_type: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "description": "Revisado, pronto para uso",
        "price": 185_000,
        "type": listing_type,
        "rental_period": if listing_type == "aluguel" { json!("diaria") } else { Value::Null },
        "brand": "Massey Ferguson",
        "model": "4275",
        "year": 2015,
        "category": "tratores",
        "location": "Rio Verde - GO",
        "image_url": null,
        "user_id": SELLER_ID,
        "created_at": "2025-03-01T12:00:00Z",
        "updated_at": "2025-03-01T12:00:00Z"
    })
}

/// A fresh random product id.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn client_request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.7")
}

/// `GET uri`, optionally with a session cookie.
#[must_use]
pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = client_request("GET", uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// `POST uri` with an urlencoded body, optionally with a session cookie.
#[must_use]
pub fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = client_request("POST", uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// `POST uri` as `multipart/form-data` with text fields and PNG files
/// under `file_field`.
#[must_use]
pub fn post_multipart(
    uri: &str,
    fields: &[(&str, &str)],
    file_field: &str,
    files: &[Vec<u8>],
    cookie: Option<&str>,
) -> Request<Body> {
    const BOUNDARY: &str = "agromaq-test-boundary";

    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (index, bytes) in files.iter().enumerate() {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{file_field}\"; filename=\"foto{index}.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = client_request("POST", uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

/// A small PNG, as a phone upload stand-in.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 90])
    });
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

/// Sign in as the fixture seller and return the session cookie and the
/// login response's redirect target.
pub async fn sign_in(app: &Router, redirect: &str) -> (String, String) {
    let body = format!(
        "email={}&password=segredo123&redirect={}",
        urlencoding::encode(SELLER_EMAIL),
        urlencoding::encode(redirect)
    );
    let response = send(app, post_form("/entrar", &body, None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response).unwrap().to_string();
    (session_cookie(&response).unwrap(), target)
}

/// Send one request through a clone of `app`.
pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

/// The `name=value` part of the session cookie, if the response set one.
#[must_use]
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("agromaq_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// The `Location` header of a redirect.
#[must_use]
pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

/// Collect and parse a JSON body.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
