//! HTTP tests for the book catalog.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{authed_request, create_admin, json_body, login, register, test_app};
use serde_json::{Value, json};
use tower::ServiceExt;

fn book(title: &str, isbn: &str) -> Value {
    json!({
        "title": title,
        "author": "Ursula K. Le Guin",
        "isbn": isbn,
        "description": "A novel",
        "priceCents": 1299,
        "stock": 4,
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_admin_crud_flow() {
    let (app, db) = test_app().await;
    create_admin(&db, "admin@example.com").await;
    let admin = login(&app, "admin@example.com").await;

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/books",
            &admin.access_token,
            Some(book("The Dispossessed", "978-0-06-051275-0")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["data"]["isbn"], "9780060512750");
    assert_eq!(body["data"]["priceCents"], 1299);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/books/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["title"], "The Dispossessed");

    let mut updated = book("The Dispossessed: An Ambiguous Utopia", "9780060512750");
    updated["stock"] = json!(0);
    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            &format!("/api/books/{}", id),
            &admin.access_token,
            Some(updated),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["stock"], 0);

    let response = app
        .clone()
        .oneshot(authed_request(
            "DELETE",
            &format!("/api/books/{}", id),
            &admin.access_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get(&format!("/api/books/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_writes_require_admin() {
    let (app, _db) = test_app().await;
    register(&app, "reader@example.com").await;
    let reader = login(&app, "reader@example.com").await;

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/api/books",
            &reader.access_token,
            Some(book("Forbidden", "9780060512750")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["success"], false);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/books")
                .header("content-type", "application/json")
                .body(Body::from(book("Anonymous", "9780060512750").to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_isbn_conflicts() {
    let (app, db) = test_app().await;
    create_admin(&db, "admin@example.com").await;
    let admin = login(&app, "admin@example.com").await;

    for (title, expected) in [
        ("First", StatusCode::CREATED),
        ("Second", StatusCode::CONFLICT),
    ] {
        let response = app
            .clone()
            .oneshot(authed_request(
                "POST",
                "/api/books",
                &admin.access_token,
                Some(book(title, "978 0 06 051275 0")),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), expected);
    }
}

#[tokio::test]
async fn test_invalid_book_rejected() {
    let (app, db) = test_app().await;
    create_admin(&db, "admin@example.com").await;
    let admin = login(&app, "admin@example.com").await;

    let mut negative = book("Cheap", "9780060512750");
    negative["priceCents"] = json!(-5);

    for body in [book("Bad ISBN", "12345"), book("   ", "9780060512750"), negative] {
        let response = app
            .clone()
            .oneshot(authed_request(
                "POST",
                "/api/books",
                &admin.access_token,
                Some(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_search_and_pagination() {
    let (app, db) = test_app().await;
    create_admin(&db, "admin@example.com").await;
    let admin = login(&app, "admin@example.com").await;

    for (title, isbn) in [
        ("A Wizard of Earthsea", "9780547773742"),
        ("The Left Hand of Darkness", "9780441478125"),
        ("The Lathe of Heaven", "9781416556961"),
    ] {
        let response = app
            .clone()
            .oneshot(authed_request(
                "POST",
                "/api/books",
                &admin.access_token,
                Some(book(title, isbn)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let body = json_body(app.clone().oneshot(get("/api/books?q=the")).await.unwrap()).await;
    assert_eq!(body["total"], 2);

    let body = json_body(
        app.clone()
            .oneshot(get("/api/books?page=2&limit=2"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 2);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["title"], "The Left Hand of Darkness");

    let response = app.oneshot(get("/api/books/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
