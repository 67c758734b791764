use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use booklog::{
    core::store::LibraryStore,
    runtime::handle::{RuntimeConfig, spawn_library},
    server::router,
};

fn app() -> Router {
    router(spawn_library(LibraryStore::new(), None, RuntimeConfig::default()))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn book_body(title: &str) -> Value {
    json!({
        "title": title,
        "author": "Italo Calvino",
        "isbn": "0-306-40615-2",
        "description": "Cities described to Kublai Khan"
    })
}

#[tokio::test]
async fn create_get_list_and_report() {
    let app = app();

    let (status, created) = send(&app, Method::POST, "/books", Some(book_body("Invisible Cities"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], 1);
    assert_eq!(created["status"], "available");
    assert_eq!(created["checkedOutBy"], Value::Null);

    let (status, fetched) = send(&app, Method::GET, "/books/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Invisible Cities");

    send(&app, Method::POST, "/books", Some(book_body("Cosmicomics"))).await;
    let (status, list) = send(&app, Method::GET, "/books", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(2));

    let (status, report) = send(&app, Method::GET, "/books/status/report", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report, json!({ "available": 2, "checkedOut": 0 }));
}

#[tokio::test]
async fn checkout_flow_maps_status_codes() {
    let app = app();
    send(&app, Method::POST, "/books", Some(book_body("If on a winter's night"))).await;

    let checkout = json!({ "userId": "u1", "dueDate": "2030-02-01" });
    let (status, book) = send(&app, Method::POST, "/books/1/check-out", Some(checkout.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["status"], "checked_out");
    assert_eq!(book["checkedOutBy"], "u1");
    assert!(book["dueDate"].as_str().is_some_and(|d| d.starts_with("2030-02-01")));

    let (status, err) = send(&app, Method::POST, "/books/1/check-out", Some(checkout)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["status"], "error");
    assert_eq!(err["kind"], "invalid_transition");

    let (status, out_only) = send(&app, Method::GET, "/books?status=checked_out", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out_only.as_array().map(Vec::len), Some(1));

    let (status, _) = send(&app, Method::POST, "/books/1/check-in", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, err) = send(&app, Method::POST, "/books/1/check-in", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "invalid_transition");

    let (status, history) = send(&app, Method::GET, "/books/1/transactions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history[0]["transactionType"], "check_in");
    assert_eq!(history[0]["userId"], "u1");
    assert_eq!(history[1]["transactionType"], "check_out");
}

#[tokio::test]
async fn missing_books_are_404() {
    let app = app();
    let checkout = json!({ "userId": "u1", "dueDate": "2030-02-01T12:00:00Z" });

    for (method, uri, body) in [
        (Method::GET, "/books/9", None),
        (Method::PATCH, "/books/9", Some(json!({ "title": "x" }))),
        (Method::DELETE, "/books/9", None),
        (Method::POST, "/books/9/check-out", Some(checkout)),
        (Method::POST, "/books/9/check-in", None),
    ] {
        let (status, err) = send(&app, method.clone(), uri, body).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(err["kind"], "not_found");
    }

    let (status, history) = send(&app, Method::GET, "/books/9/transactions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn bad_requests_are_400() {
    let app = app();
    send(&app, Method::POST, "/books", Some(book_body("Mr. Palomar"))).await;

    let (status, err) = send(
        &app,
        Method::POST,
        "/books",
        Some(json!({ "title": "", "author": "a", "isbn": "123", "description": "d" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "validation");
    let fields: Vec<_> = err["fields"]
        .as_array()
        .expect("fields")
        .iter()
        .filter_map(|f| f["field"].as_str())
        .collect();
    assert_eq!(fields, vec!["title", "isbn"]);

    let (status, _) = send(&app, Method::PATCH, "/books/1", Some(json!({ "status": "checked_out" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/books/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/books?status=lost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/books/1/check-out",
        Some(json!({ "userId": "u1", "dueDate": "next tuesday" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, err) = send(
        &app,
        Method::POST,
        "/books/1/check-out",
        Some(json!({ "userId": "  ", "dueDate": "2030-02-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "validation");
}

#[tokio::test]
async fn patch_delete_and_manual_transactions() {
    let app = app();
    send(&app, Method::POST, "/books", Some(book_body("Baron in the Trees"))).await;

    let (status, patched) = send(
        &app,
        Method::PATCH,
        "/books/1",
        Some(json!({ "title": "The Baron in the Trees" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["title"], "The Baron in the Trees");
    assert_eq!(patched["author"], "Italo Calvino");

    let (status, txn) = send(
        &app,
        Method::POST,
        "/books/transactions",
        Some(json!({ "bookId": 1, "transactionType": "check_out", "userId": "u3", "notes": "imported" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(txn["bookId"], 1);
    assert_eq!(txn["notes"], "imported");

    let (status, book) = send(&app, Method::GET, "/books/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["status"], "available");

    let (status, err) = send(
        &app,
        Method::POST,
        "/books/transactions",
        Some(json!({ "bookId": 77, "transactionType": "check_in" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["kind"], "not_found");

    let (status, body) = send(&app, Method::DELETE, "/books/1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    let (status, _) = send(&app, Method::GET, "/books/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, history) = send(&app, Method::GET, "/books/1/transactions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn health_endpoint_responds() {
    let app = app();
    let response = app
        .oneshot(Request::builder().uri("/-/healthy").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}
