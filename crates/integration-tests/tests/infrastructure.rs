//! Health checks, response headers, content pages and the lookup API.

#![allow(clippy::unwrap_used)]

use axum::http::{StatusCode, header};

use agromaq_integration_tests::{FakeBackend, KNOWN_CEP, body_json, get, send};

#[tokio::test]
async fn test_health_and_readiness() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();

    let live = send(&app, get("/health", None)).await;
    assert_eq!(live.status(), StatusCode::OK);

    let ready = send(&app, get("/health/ready", None)).await;
    assert_eq!(ready.status(), StatusCode::OK);
    assert_eq!(backend.product_hits(), 1);
}

#[tokio::test]
async fn test_responses_carry_security_and_request_id_headers() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();

    let response = send(&app, get("/sobre", None)).await;
    let headers = response.headers();

    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert!(
        headers[header::CONTENT_SECURITY_POLICY]
            .to_str()
            .unwrap()
            .contains("https://*.supabase.co")
    );
    assert!(!headers["x-request-id"].is_empty());
}

#[tokio::test]
async fn test_unknown_path_is_json_not_found() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();

    let response = send(&app, get("/trator-voador", None)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Página não encontrada.");
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_content_pages_render_markdown() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();

    let body = body_json(send(&app, get("/como-funciona", None)).await).await;

    assert_eq!(body["page"], "como-funciona");
    assert!(
        body["data"]["content_html"]
            .as_str()
            .unwrap()
            .contains("<h2>")
    );
    assert!(!body["data"]["meta"]["faq"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_contact_page_shows_configured_details() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();

    let body = body_json(send(&app, get("/contato", None)).await).await;

    assert_eq!(body["data"]["contact"]["email"], "contato@agromaq.com.br");
}

#[tokio::test]
async fn test_cep_lookup_fills_address() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();

    let response = send(&app, get(&format!("/api/cep/{KNOWN_CEP}"), None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["address"]["city"], "Uberlândia");
    assert_eq!(body["address"]["state"], "MG");
    assert_eq!(body["notice"]["level"], "success");
}

#[tokio::test]
async fn test_cep_lookup_failures() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();

    let unknown = send(&app, get("/api/cep/99999-999", None)).await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    let body = body_json(unknown).await;
    assert!(body["address"].is_null());
    assert_eq!(body["notice"]["level"], "warning");

    let malformed = send(&app, get("/api/cep/123", None)).await;
    assert_eq!(malformed.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
