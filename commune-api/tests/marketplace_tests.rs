//! Integration tests for the service-provider marketplace

mod helpers;

use axum::http::StatusCode;
use helpers::{Session, TestApp};
use serde_json::{json, Value};

async fn list_provider(app: &TestApp, owner: &Session, body: Value) -> (StatusCode, Value) {
    app.post("/api/marketplace/providers", Some(&owner.token), body)
        .await
}

#[tokio::test]
async fn test_create_and_browse_providers() {
    let app = TestApp::new().await;
    let owner = app.login("rae@example.org").await;

    let (status, provider) = list_provider(
        &app,
        &owner,
        json!({
            "name": "Rae's Kitchen",
            "category": "CATERING",
            "description": "Vegetarian buffets",
            "location": "Portland",
            "price_min_cents": 50_000,
            "price_max_cents": 200_000,
            "contact_email": "Bookings@RaesKitchen.example",
            "website": "https://raeskitchen.example",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", provider);
    assert_eq!(provider["contact_email"], "bookings@raeskitchen.example");
    assert_eq!(provider["owner_id"], owner.member_id.to_string());

    list_provider(
        &app,
        &owner,
        json!({
            "name": "Snapshots",
            "category": "PHOTOGRAPHY",
            "location": "Seattle",
            "contact_email": "hi@snapshots.example",
        }),
    )
    .await;

    // Browsing is public
    let (status, page) = app.get("/api/marketplace/providers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);

    let (_, page) = app
        .get("/api/marketplace/providers?category=photography", None)
        .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["name"], "Snapshots");

    let (_, page) = app.get("/api/marketplace/providers?q=buffet", None).await;
    assert_eq!(page["total"], 1);

    let (_, page) = app.get("/api/marketplace/providers?location=port", None).await;
    assert_eq!(page["items"][0]["name"], "Rae's Kitchen");

    let (status, _) = app
        .get("/api/marketplace/providers?category=plumbing", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, fetched) = app
        .get(
            &format!("/api/marketplace/providers/{}", provider["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["category"], "CATERING");
}

#[tokio::test]
async fn test_provider_validation() {
    let app = TestApp::new().await;
    let owner = app.login("sol@example.org").await;

    let (status, _) = list_provider(
        &app,
        &owner,
        json!({
            "name": "Backwards",
            "category": "VENUE",
            "price_min_cents": 5_000,
            "price_max_cents": 1_000,
            "contact_email": "hall@example.org",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = list_provider(
        &app,
        &owner,
        json!({ "name": "No mail", "category": "VENUE", "contact_email": "nope" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/marketplace/providers",
            None,
            json!({ "name": "Anon", "category": "MUSIC", "contact_email": "a@example.org" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_only_owner_or_super_admin_edits() {
    let app = TestApp::new().await;
    let owner = app.login("tom@example.org").await;
    let intruder = app.login("ulf@example.org").await;
    let root = app.login_super_admin().await;

    let (_, provider) = list_provider(
        &app,
        &owner,
        json!({ "name": "Tom's Tunes", "category": "MUSIC", "contact_email": "tom@example.org" }),
    )
    .await;
    let uri = format!("/api/marketplace/providers/{}", provider["id"].as_str().unwrap());

    let (status, _) = app
        .patch(&uri, Some(&intruder.token), json!({ "name": "Mine now" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app
        .patch(
            &uri,
            Some(&owner.token),
            json!({ "price_min_cents": 10_000, "description": "Jazz trio" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price_min_cents"], 10_000);
    assert_eq!(updated["description"], "Jazz trio");

    let (status, _) = app
        .patch(&uri, Some(&owner.token), json!({ "price_max_cents": 5_000 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.delete(&uri, Some(&intruder.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.delete(&uri, Some(&root.token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
