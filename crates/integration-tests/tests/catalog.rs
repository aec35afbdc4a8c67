//! Product lists are cached for the freshness window.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;

use agromaq_integration_tests::{
    FakeBackend, body_json, get, new_id, product_row, send,
};

#[tokio::test]
async fn test_repeated_list_is_served_from_cache() {
    let backend = FakeBackend::spawn(vec![
        product_row(&new_id(), "Trator MF 4275", "venda"),
        product_row(&new_id(), "Plantadeira 12 linhas", "aluguel"),
    ])
    .await;
    let app = backend.app();

    let first = body_json(send(&app, get("/comprar", None)).await).await;
    let second = body_json(send(&app, get("/comprar", None)).await).await;

    assert_eq!(backend.product_hits(), 1);
    assert_eq!(first["data"]["listings"]["products"].as_array().unwrap().len(), 1);
    assert_eq!(second["data"]["listings"]["from_cache"], true);
    assert_eq!(
        second["data"]["listings"]["products"][0]["title"],
        "Trator MF 4275"
    );
}

#[tokio::test]
async fn test_refresh_bypasses_cache() {
    let backend = FakeBackend::spawn(vec![product_row(&new_id(), "Trator", "venda")]).await;
    let app = backend.app();

    send(&app, get("/comprar", None)).await;
    send(&app, get("/comprar?atualizar=1", None)).await;

    assert_eq!(backend.product_hits(), 2);
}

#[tokio::test]
async fn test_different_filters_are_cached_separately() {
    let backend = FakeBackend::spawn(vec![product_row(&new_id(), "Trator", "venda")]).await;
    let app = backend.app();

    send(&app, get("/comprar", None)).await;
    send(&app, get("/alugar", None)).await;
    send(&app, get("/comprar?marca=Valtra", None)).await;
    send(&app, get("/comprar?marca=%20Valtra%20", None)).await;

    assert_eq!(backend.product_hits(), 3);
}

#[tokio::test]
async fn test_invalid_filter_is_rejected() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();

    let response = send(&app, get("/comprar?categoria=avioes", None)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(backend.product_hits(), 0);
}

#[tokio::test]
async fn test_product_detail_includes_seller_and_rental_label() {
    let id = new_id();
    let backend = FakeBackend::spawn(vec![product_row(&id, "Colheitadeira", "aluguel")]).await;
    let app = backend.app();

    let response = send(&app, get(&format!("/produto/{id}"), None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["page"], "produto");
    assert_eq!(body["data"]["price_label"], "R$ 185.000,00 por dia");
    assert_eq!(body["data"]["seller"]["name"], "Fazenda Boa Vista");
    assert_eq!(body["data"]["seller"]["location"], "Rio Verde - GO");
    assert_eq!(body["data"]["is_owner"], false);
}

#[tokio::test]
async fn test_missing_product_is_not_found() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();

    let response = send(&app, get(&format!("/produto/{}", new_id()), None)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Anúncio não encontrado.");
}
