//! Publishing and deleting listings against the fake store.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::Value;

use agromaq_integration_tests::{
    BackendCall, FakeBackend, Fault, SELLER_ID, get, location, new_id, png, post_form,
    post_multipart, product_row, send, sign_in,
};

const LISTING: &[(&str, &str)] = &[
    ("title", "Trator Valtra A950"),
    ("price", "185.000"),
    ("listing_type", "venda"),
    ("category", "tratores"),
    ("location", "Rio Verde - GO"),
];

fn uploads(calls: &[BackendCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|call| match call {
            BackendCall::Upload(path) => Some(path.clone()),
            _ => None,
        })
        .collect()
}

fn inserted_product(calls: &[BackendCall]) -> Value {
    calls
        .iter()
        .find_map(|call| match call {
            BackendCall::InsertProduct(row) => Some(row.clone()),
            _ => None,
        })
        .unwrap()
}

fn removed_objects(calls: &[BackendCall]) -> Vec<String> {
    calls
        .iter()
        .filter_map(|call| match call {
            BackendCall::RemoveObjects(paths) => Some(paths.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

#[tokio::test]
async fn test_publish_uploads_in_order_and_writes_gallery() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    let app = backend.app();
    let (cookie, _) = sign_in(&app, "/vender").await;

    let photos = vec![png(40, 30), png(30, 40), png(20, 20)];
    let response = send(
        &app,
        post_multipart("/vender", LISTING, "imagens", &photos, Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let calls = backend.calls();
    let row = inserted_product(&calls);
    let product_id = row["id"].as_str().unwrap().to_string();
    assert_eq!(
        location(&response).map(str::to_string),
        Some(format!("/produto/{product_id}"))
    );

    let expected: Vec<String> = (0..3)
        .map(|i| format!("{SELLER_ID}/{product_id}/{i}.jpg"))
        .collect();
    assert_eq!(uploads(&calls), expected);

    // Every upload finishes before the listing row is written
    let first_insert = calls
        .iter()
        .position(|c| matches!(c, BackendCall::InsertProduct(_)))
        .unwrap();
    let last_upload = calls
        .iter()
        .rposition(|c| matches!(c, BackendCall::Upload(_)))
        .unwrap();
    assert!(last_upload < first_insert);

    assert_eq!(row["image_url"], backend.public_url(&expected[0]));
    assert_eq!(row["user_id"], SELLER_ID);
    assert_eq!(row["price"].as_str().unwrap().split('.').next(), Some("185000"));

    let gallery = calls
        .iter()
        .find_map(|call| match call {
            BackendCall::InsertImages(rows) => Some(rows.clone()),
            _ => None,
        })
        .unwrap();
    let positions: Vec<i64> = gallery.iter().map(|r| r["position"].as_i64().unwrap()).collect();
    assert_eq!(positions, vec![1, 2]);
    assert_eq!(gallery[0]["image_url"], backend.public_url(&expected[1]));
    assert_eq!(gallery[1]["image_url"], backend.public_url(&expected[2]));
    assert!(removed_objects(&calls).is_empty());
}

#[tokio::test]
async fn test_failed_listing_insert_discards_uploads() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    backend.inject(Fault::ProductInsert);
    let app = backend.app();
    let (cookie, _) = sign_in(&app, "/vender").await;

    let photos = vec![png(40, 30), png(30, 40)];
    let response = send(
        &app,
        post_multipart("/vender", LISTING, "imagens", &photos, Some(&cookie)),
    )
    .await;
    assert!(response.status().is_server_error());

    let calls = backend.calls();
    assert_eq!(removed_objects(&calls), uploads(&calls));
    assert_eq!(uploads(&calls).len(), 2);
    assert!(!calls.iter().any(|c| matches!(c, BackendCall::InsertImages(_))));
    assert!(backend.products().is_empty());
}

#[tokio::test]
async fn test_failed_gallery_insert_rolls_back_listing() {
    let backend = FakeBackend::spawn(Vec::new()).await;
    backend.inject(Fault::ImageInsert);
    let app = backend.app();
    let (cookie, _) = sign_in(&app, "/vender").await;

    let photos = vec![png(40, 30), png(30, 40)];
    let response = send(
        &app,
        post_multipart("/vender", LISTING, "imagens", &photos, Some(&cookie)),
    )
    .await;
    assert!(response.status().is_server_error());

    let calls = backend.calls();
    let deletes: Vec<&BackendCall> = calls
        .iter()
        .filter(|c| matches!(c, BackendCall::Delete(_)))
        .collect();
    assert_eq!(
        deletes,
        vec![
            &BackendCall::Delete("products"),
            &BackendCall::Delete("product_images")
        ]
    );
    assert_eq!(removed_objects(&calls), uploads(&calls));
    assert!(backend.products().is_empty());
}

#[tokio::test]
async fn test_delete_removes_listing_before_gallery() {
    let id = new_id();
    let backend = FakeBackend::spawn(vec![product_row(&id, "Colheitadeira", "venda")]).await;
    let app = backend.app();
    let (cookie, _) = sign_in(&app, "/meus-anuncios").await;

    let response = send(
        &app,
        post_form(&format!("/editar-anuncio/{id}/excluir"), "", Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let deletes: Vec<BackendCall> = backend
        .calls()
        .into_iter()
        .filter(|c| matches!(c, BackendCall::Delete(_)))
        .collect();
    assert_eq!(
        deletes,
        vec![
            BackendCall::Delete("products"),
            BackendCall::Delete("product_images")
        ]
    );
    assert!(backend.products().is_empty());
}

#[tokio::test]
async fn test_rejected_delete_keeps_gallery() {
    let id = new_id();
    let backend = FakeBackend::spawn(vec![product_row(&id, "Colheitadeira", "venda")]).await;
    backend.inject(Fault::ProductDelete);
    let app = backend.app();
    let (cookie, _) = sign_in(&app, "/meus-anuncios").await;

    let response = send(
        &app,
        post_form(&format!("/editar-anuncio/{id}/excluir"), "", Some(&cookie)),
    )
    .await;
    assert!(response.status().is_server_error());

    let calls = backend.calls();
    assert!(calls.contains(&BackendCall::Delete("products")));
    assert!(!calls.contains(&BackendCall::Delete("product_images")));
    assert!(removed_objects(&calls).is_empty());
    assert_eq!(backend.products().len(), 1);

    let page = send(&app, get(&format!("/produto/{id}"), None)).await;
    assert_eq!(page.status(), StatusCode::OK);
}
