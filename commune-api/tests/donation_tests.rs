//! Integration tests for donations and donation goals
//!
//! Tests cover:
//! - Pledges by active members, received donations by managers
//! - Donor anonymity in listings
//! - Status transitions
//! - Goals, progress and the donation summary
//! - Amount limits

mod helpers;

use axum::http::StatusCode;
use helpers::{Session, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

struct Fixture {
    treasurer: Session,
    donor: Session,
    other: Session,
    community: Uuid,
}

async fn fixture(app: &TestApp) -> Fixture {
    let admin = app.login_super_admin().await;
    let org = app.create_organization(&admin, "Charity").await;
    let treasurer = app.login("nia@example.org").await;
    let community = app
        .create_community(&treasurer, org, "Food Bank", None, false)
        .await;
    let donor = app.login("oto@example.org").await;
    let other = app.login("pia@example.org").await;
    app.join(&donor, community).await;
    app.join(&other, community).await;

    Fixture {
        treasurer,
        donor,
        other,
        community,
    }
}

async fn donate(app: &TestApp, who: &Session, community: Uuid, body: Value) -> (StatusCode, Value) {
    app.post(&format!("/api/communities/{}/donations", community), Some(&who.token), body)
        .await
}

#[tokio::test]
async fn test_pledge_and_validation() {
    let app = TestApp::new().await;
    let f = fixture(&app).await;

    let (status, donation) = donate(&app, &f.donor, f.community, json!({ "amount_cents": 2_500 })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(donation["status"], "PLEDGED");
    assert_eq!(donation["currency"], "USD");
    assert_eq!(donation["donor_id"], f.donor.member_id.to_string());

    let (status, _) = donate(&app, &f.donor, f.community, json!({ "amount_cents": 0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Only managers record received money
    let (status, _) = donate(
        &app,
        &f.donor,
        f.community,
        json!({ "amount_cents": 100, "received": true }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, received) = donate(
        &app,
        &f.treasurer,
        f.community,
        json!({ "amount_cents": 100, "received": true }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(received["status"], "RECEIVED");

    // Non-members cannot donate
    let stranger = app.login("quo@example.org").await;
    let (status, _) = donate(&app, &stranger, f.community, json!({ "amount_cents": 100 })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_anonymous_donor_hidden_from_other_members() {
    let app = TestApp::new().await;
    let f = fixture(&app).await;

    donate(
        &app,
        &f.donor,
        f.community,
        json!({ "amount_cents": 5_000, "anonymous": true, "message": "Keep it up" }),
    )
    .await;

    let uri = format!("/api/communities/{}/donations", f.community);

    let (status, page) = app.get(&uri, Some(&f.other.token)).await;
    assert_eq!(status, StatusCode::OK);
    let item = &page["items"][0];
    assert!(item["donor_id"].is_null());
    assert!(item["donor_name"].is_null());
    assert_eq!(item["message"], "Keep it up");

    let (_, page) = app.get(&uri, Some(&f.donor.token)).await;
    assert_eq!(page["items"][0]["donor_id"], f.donor.member_id.to_string());

    let (_, page) = app.get(&uri, Some(&f.treasurer.token)).await;
    assert_eq!(page["items"][0]["donor_name"], "Oto");
}

#[tokio::test]
async fn test_status_transitions() {
    let app = TestApp::new().await;
    let f = fixture(&app).await;

    let (_, pledge) = donate(&app, &f.donor, f.community, json!({ "amount_cents": 700 })).await;
    let uri = format!("/api/donations/{}/status", pledge["id"].as_str().unwrap());

    let (status, _) = app
        .patch(&uri, Some(&f.donor.token), json!({ "status": "RECEIVED" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app
        .patch(&uri, Some(&f.treasurer.token), json!({ "status": "RECEIVED" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "RECEIVED");

    let (status, _) = app
        .patch(&uri, Some(&f.treasurer.token), json!({ "status": "CANCELLED" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .patch(
            &format!("/api/donations/{}/status", Uuid::new_v4()),
            Some(&f.treasurer.token),
            json!({ "status": "RECEIVED" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_goals_progress_and_closing() {
    let app = TestApp::new().await;
    let f = fixture(&app).await;
    let goals_uri = format!("/api/communities/{}/goals", f.community);

    let (status, _) = app
        .post(
            &goals_uri,
            Some(&f.donor.token),
            json!({ "title": "New van", "target_cents": 10_000 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, goal) = app
        .post(
            &goals_uri,
            Some(&f.treasurer.token),
            json!({ "title": "New van", "target_cents": 10_000, "deadline": "2030-12-31" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(goal["progress"]["percent_funded"], 0.0);
    let goal_id = goal["id"].as_str().unwrap().to_string();

    donate(
        &app,
        &f.treasurer,
        f.community,
        json!({ "amount_cents": 2_500, "goal_id": goal_id, "received": true }),
    )
    .await;
    donate(&app, &f.donor, f.community, json!({ "amount_cents": 1_000, "goal_id": goal_id })).await;

    let (status, goals) = app.get(&goals_uri, Some(&f.other.token)).await;
    assert_eq!(status, StatusCode::OK);
    let progress = &goals[0]["progress"];
    assert_eq!(progress["received_cents"], 2_500);
    assert_eq!(progress["pledged_cents"], 1_000);
    assert_eq!(progress["percent_funded"], 25.0);

    let close_uri = format!("/api/goals/{}/close", goal_id);
    let (status, closed) = app.post(&close_uri, Some(&f.treasurer.token), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(closed["closed_at"].is_string());

    let (status, _) = app.post(&close_uri, Some(&f.treasurer.token), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Closed goals take no more donations
    let (status, _) = donate(
        &app,
        &f.donor,
        f.community,
        json!({ "amount_cents": 500, "goal_id": goal_id }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Goals of other communities are rejected
    let (status, _) = donate(
        &app,
        &f.donor,
        f.community,
        json!({ "amount_cents": 500, "goal_id": Uuid::new_v4() }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_summary_excludes_cancelled() {
    let app = TestApp::new().await;
    let f = fixture(&app).await;

    donate(
        &app,
        &f.treasurer,
        f.community,
        json!({ "amount_cents": 4_000, "received": true }),
    )
    .await;
    donate(&app, &f.donor, f.community, json!({ "amount_cents": 1_500 })).await;
    let (_, cancelled) = donate(&app, &f.other, f.community, json!({ "amount_cents": 9_999 })).await;
    app.patch(
        &format!("/api/donations/{}/status", cancelled["id"].as_str().unwrap()),
        Some(&f.treasurer.token),
        json!({ "status": "CANCELLED" }),
    )
    .await;

    let uri = format!("/api/communities/{}/donations/summary", f.community);

    let (status, _) = app.get(&uri, Some(&f.donor.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, summary) = app.get(&uri, Some(&f.treasurer.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["received_cents"], 4_000);
    assert_eq!(summary["pledged_cents"], 1_500);
    assert_eq!(summary["donation_count"], 2);
    assert_eq!(summary["donor_count"], 2);
    assert_eq!(summary["currency"], "USD");

    let months = summary["by_month"].as_array().unwrap();
    assert_eq!(months.len(), 1);
    assert_eq!(months[0]["received_cents"], 4_000);
    assert_eq!(months[0]["donation_count"], 2);

    // Status filter on the listing
    let (_, page) = app
        .get(
            &format!("/api/communities/{}/donations?status=cancelled", f.community),
            Some(&f.treasurer.token),
        )
        .await;
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn test_amounts_are_capped() {
    let app = TestApp::new().await;
    let f = fixture(&app).await;
    let max = commune_api::api::donations::MAX_AMOUNT_CENTS;

    let (status, body) = donate(&app, &f.donor, f.community, json!({ "amount_cents": i64::MAX })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, _) = app
        .post(
            &format!("/api/communities/{}/goals", f.community),
            Some(&f.treasurer.token),
            json!({ "title": "Moonshot", "target_cents": i64::MAX }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Two maximal pledges still total without overflow
    for who in [&f.donor, &f.other] {
        let (status, _) = donate(&app, who, f.community, json!({ "amount_cents": max })).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, summary) = app
        .get(
            &format!("/api/communities/{}/donations/summary", f.community),
            Some(&f.treasurer.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", summary);
    assert_eq!(summary["pledged_cents"], max * 2);
}
