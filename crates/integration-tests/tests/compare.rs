//! The comparison list lives in the visitor's session.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;

use agromaq_integration_tests::{
    FakeBackend, body_json, get, location, new_id, post_form, product_row, send, session_cookie,
};

#[tokio::test]
async fn test_added_listing_shows_on_compare_page() {
    let id = new_id();
    let backend = FakeBackend::spawn(vec![product_row(&id, "Trator MF 4275", "venda")]).await;
    let app = backend.app();

    let added = send(
        &app,
        post_form("/comparar", &format!("product_id={id}&voltar=%2Fcomprar"), None),
    )
    .await;
    assert_eq!(added.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&added), Some("/comprar"));
    let cookie = session_cookie(&added).unwrap();

    let body = body_json(send(&app, get("/comparar", Some(&cookie))).await).await;
    assert_eq!(body["data"]["items"][0]["product"]["id"], id.as_str());
    assert_eq!(body["data"]["max_items"], 4);
    assert_eq!(body["notices"][0]["level"], "success");

    // Notices are shown once.
    let again = body_json(send(&app, get("/comparar", Some(&cookie))).await).await;
    assert!(again["notices"].as_array().unwrap().is_empty());
    assert_eq!(again["data"]["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_fifth_listing_is_refused() {
    let ids: Vec<String> = (0..5).map(|_| new_id()).collect();
    let rows = ids
        .iter()
        .map(|id| product_row(id, "Implemento", "venda"))
        .collect();
    let backend = FakeBackend::spawn(rows).await;
    let app = backend.app();

    let mut cookie: Option<String> = None;
    for id in &ids {
        let response = send(
            &app,
            post_form("/comparar", &format!("product_id={id}"), cookie.as_deref()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        if cookie.is_none() {
            cookie = session_cookie(&response);
        }
    }

    let body = body_json(send(&app, get("/comparar", cookie.as_deref())).await).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 4);
    assert!(items.iter().all(|item| item["product"]["id"] != ids[4].as_str()));
    assert_eq!(body["notices"].as_array().unwrap().last().unwrap()["level"], "warning");
}

#[tokio::test]
async fn test_duplicate_add_does_not_refetch() {
    let id = new_id();
    let backend = FakeBackend::spawn(vec![product_row(&id, "Trator", "venda")]).await;
    let app = backend.app();

    let first = send(&app, post_form("/comparar", &format!("product_id={id}"), None)).await;
    let cookie = session_cookie(&first).unwrap();
    send(
        &app,
        post_form("/comparar", &format!("product_id={id}"), Some(&cookie)),
    )
    .await;

    assert_eq!(backend.product_hits(), 1);
    let body = body_json(send(&app, get("/comparar", Some(&cookie))).await).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["notices"][1]["level"], "info");
}

#[tokio::test]
async fn test_remove_and_clear() {
    let ids = [new_id(), new_id()];
    let backend = FakeBackend::spawn(
        ids.iter()
            .map(|id| product_row(id, "Trator", "venda"))
            .collect(),
    )
    .await;
    let app = backend.app();

    let first = send(&app, post_form("/comparar", &format!("product_id={}", ids[0]), None)).await;
    let cookie = session_cookie(&first).unwrap();
    send(
        &app,
        post_form("/comparar", &format!("product_id={}", ids[1]), Some(&cookie)),
    )
    .await;

    send(
        &app,
        post_form("/comparar/remover", &format!("product_id={}", ids[0]), Some(&cookie)),
    )
    .await;
    let body = body_json(send(&app, get("/comparar", Some(&cookie))).await).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product"]["id"], ids[1].as_str());

    let cleared = send(&app, post_form("/comparar/limpar", "", Some(&cookie))).await;
    assert_eq!(cleared.status(), StatusCode::SEE_OTHER);
    let body = body_json(send(&app, get("/comparar", Some(&cookie))).await).await;
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_listing_is_reported_not_added() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();

    let response = send(
        &app,
        post_form("/comparar", &format!("product_id={}", new_id()), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = session_cookie(&response).unwrap();

    let body = body_json(send(&app, get("/comparar", Some(&cookie))).await).await;
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
    assert_eq!(body["notices"][0]["level"], "error");
    assert_eq!(body["notices"][0]["message"], "Registro não encontrado.");
}
