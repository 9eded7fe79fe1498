//! Integration tests for memberships and role assignments
//!
//! Tests cover:
//! - Joining open and approval-required communities
//! - Status changes by managers, last-admin protection
//! - Suspension revoking admin rights and blocking rejoin
//! - Member list visibility and email privacy
//! - Primary community selection
//! - COMMUNITY_ADMIN and SUPER_ADMIN grants and revocations

mod helpers;

use axum::http::StatusCode;
use helpers::{Session, TestApp};
use serde_json::json;
use uuid::Uuid;

/// Organization plus one community founded by `founder`
async fn setup(app: &TestApp, founder: &Session, requires_approval: bool) -> Uuid {
    let admin = app.login_super_admin().await;
    let org = app.create_organization(&admin, "Neighbours").await;
    app.create_community(founder, org, "Maple Street", None, requires_approval)
        .await
}

#[tokio::test]
async fn test_join_open_community_is_active() {
    let app = TestApp::new().await;
    let founder = app.login("olga@example.org").await;
    let community = setup(&app, &founder, false).await;
    let member = app.login("pat@example.org").await;

    assert_eq!(app.join(&member, community).await, "ACTIVE");

    let (status, body) = app
        .post(&format!("/api/communities/{}/join", community), Some(&member.token), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (_, me) = app.get("/api/me/communities", Some(&member.token)).await;
    assert_eq!(me[0]["community_id"], community.to_string());
    assert_eq!(me[0]["is_primary"], true);
}

#[tokio::test]
async fn test_join_requiring_approval_is_pending() {
    let app = TestApp::new().await;
    let founder = app.login("quinn@example.org").await;
    let community = setup(&app, &founder, true).await;
    let member = app.login("ray@example.org").await;

    assert_eq!(app.join(&member, community).await, "PENDING");

    // Pending members cannot see internals
    let (status, _) = app
        .get(&format!("/api/communities/{}/members", community), Some(&member.token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Pending memberships are never primary
    let (_, me) = app.get("/api/me", Some(&member.token)).await;
    assert!(me["primary_community_id"].is_null());

    let (status, updated) = app
        .patch(
            &format!("/api/communities/{}/members/{}/status", community, member.member_id),
            Some(&founder.token),
            json!({ "status": "ACTIVE" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "ACTIVE");
    assert_eq!(updated["is_primary"], true);

    // The member was told about the decision
    let told = app
        .notifier
        .sent()
        .into_iter()
        .any(|n| n.to == "ray@example.org" && n.template == "membership_status");
    assert!(told);
}

#[tokio::test]
async fn test_suspended_member_cannot_rejoin() {
    let app = TestApp::new().await;
    let founder = app.login("sam@example.org").await;
    let community = setup(&app, &founder, false).await;
    let member = app.login("tia@example.org").await;
    app.join(&member, community).await;

    let (status, _) = app
        .patch(
            &format!("/api/communities/{}/members/{}/status", community, member.member_id),
            Some(&founder.token),
            json!({ "status": "SUSPENDED" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(&format!("/api/communities/{}/join", community), Some(&member.token), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_inactive_member_rejoins() {
    let app = TestApp::new().await;
    let founder = app.login("uma@example.org").await;
    let community = setup(&app, &founder, false).await;
    let member = app.login("vic@example.org").await;
    app.join(&member, community).await;

    let uri = format!("/api/communities/{}/members/{}/status", community, member.member_id);
    let (status, body) = app
        .patch(&uri, Some(&founder.token), json!({ "status": "INACTIVE" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_primary"], false);

    assert_eq!(app.join(&member, community).await, "ACTIVE");
}

#[tokio::test]
async fn test_status_change_rules() {
    let app = TestApp::new().await;
    let founder = app.login("wes@example.org").await;
    let community = setup(&app, &founder, false).await;
    let member = app.login("xia@example.org").await;
    app.join(&member, community).await;

    // Plain members cannot manage
    let (status, _) = app
        .patch(
            &format!("/api/communities/{}/members/{}/status", community, founder.member_id),
            Some(&member.token),
            json!({ "status": "SUSPENDED" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Managers cannot change their own status
    let (status, _) = app
        .patch(
            &format!("/api/communities/{}/members/{}/status", community, founder.member_id),
            Some(&founder.token),
            json!({ "status": "INACTIVE" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown status value
    let (status, body) = app
        .patch(
            &format!("/api/communities/{}/members/{}/status", community, member.member_id),
            Some(&founder.token),
            json!({ "status": "BANNED" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "UNPROCESSABLE_ENTITY");
}

#[tokio::test]
async fn test_last_admin_cannot_be_deactivated() {
    let app = TestApp::new().await;
    let founder = app.login("yan@example.org").await;
    let community = setup(&app, &founder, false).await;
    let admin = app.login_super_admin().await;

    let (status, body) = app
        .patch(
            &format!("/api/communities/{}/members/{}/status", community, founder.member_id),
            Some(&admin.token),
            json!({ "status": "SUSPENDED" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
}

#[tokio::test]
async fn test_suspended_admin_loses_management() {
    let app = TestApp::new().await;
    let founder = app.login("una@example.org").await;
    let community = setup(&app, &founder, false).await;
    let deputy = app.login("vic@example.org").await;
    app.join(&deputy, community).await;

    let (status, _) = app
        .post(
            &format!("/api/communities/{}/roles", community),
            Some(&founder.token),
            json!({ "member_id": deputy.member_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let status_uri = |member: Uuid| format!("/api/communities/{}/members/{}/status", community, member);

    let (status, _) = app
        .patch(&status_uri(deputy.member_id), Some(&founder.token), json!({ "status": "SUSPENDED" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    // The suspended deputy keeps the role on paper but cannot use it
    let (status, _) = app
        .patch(&status_uri(founder.member_id), Some(&deputy.token), json!({ "status": "SUSPENDED" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .get(&format!("/api/communities/{}/members", community), Some(&deputy.token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The founder is now the only ACTIVE admin
    let root = app.login_super_admin().await;
    let (status, _) = app
        .patch(&status_uri(founder.member_id), Some(&root.token), json!({ "status": "INACTIVE" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Reinstated, the deputy manages again and the founder may step back
    let (status, _) = app
        .patch(&status_uri(deputy.member_id), Some(&founder.token), json!({ "status": "ACTIVE" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .patch(&status_uri(founder.member_id), Some(&deputy.token), json!({ "status": "INACTIVE" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_suspended_member_cannot_leave_and_rejoin() {
    let app = TestApp::new().await;
    let founder = app.login("wes@example.org").await;
    let community = setup(&app, &founder, false).await;
    let member = app.login("xia@example.org").await;
    app.join(&member, community).await;

    let (status, _) = app
        .patch(
            &format!("/api/communities/{}/members/{}/status", community, member.member_id),
            Some(&founder.token),
            json!({ "status": "SUSPENDED" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .delete(
            &format!("/api/communities/{}/members/{}", community, member.member_id),
            Some(&member.token),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{}", body);

    let (status, _) = app
        .post(&format!("/api/communities/{}/join", community), Some(&member.token), json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_member_list_hides_emails_from_members() {
    let app = TestApp::new().await;
    let founder = app.login("zed@example.org").await;
    let community = setup(&app, &founder, false).await;
    let member = app.login("abe@example.org").await;
    app.join(&member, community).await;

    let uri = format!("/api/communities/{}/members", community);

    let (status, page) = app.get(&uri, Some(&founder.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    let items = page["items"].as_array().unwrap();
    assert!(items.iter().all(|m| m["email"].is_string()));
    let founder_entry = items
        .iter()
        .find(|m| m["member_id"] == founder.member_id.to_string())
        .unwrap();
    assert_eq!(founder_entry["roles"][0], "COMMUNITY_ADMIN");

    let (status, page) = app.get(&uri, Some(&member.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|m| m.get("email").is_none()));

    let (_, page) = app
        .get(&format!("{}?status=pending", uri), Some(&founder.token))
        .await;
    assert_eq!(page["total"], 0);

    let outsider = app.login("bea@example.org").await;
    let (status, _) = app.get(&uri, Some(&outsider.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_leave_and_last_admin_removal() {
    let app = TestApp::new().await;
    let founder = app.login("cal@example.org").await;
    let community = setup(&app, &founder, false).await;
    let member = app.login("dee@example.org").await;
    app.join(&member, community).await;

    // Founder is the only admin and others remain
    let (status, _) = app
        .delete(
            &format!("/api/communities/{}/members/{}", community, founder.member_id),
            Some(&founder.token),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A member may leave on their own
    let (status, _) = app
        .delete(
            &format!("/api/communities/{}/members/{}", community, member.member_id),
            Some(&member.token),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Now alone, the founder can leave too
    let (status, _) = app
        .delete(
            &format!("/api/communities/{}/members/{}", community, founder.member_id),
            Some(&founder.token),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, me) = app.get("/api/me", Some(&founder.token)).await;
    assert!(me["roles"].as_array().unwrap().is_empty());
    assert!(me["memberships"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_primary_community_switch() {
    let app = TestApp::new().await;
    let admin = app.login_super_admin().await;
    let org = app.create_organization(&admin, "Twin Towns").await;
    let member = app.login("eli@example.org").await;

    let first = app.create_community(&admin, org, "East", None, false).await;
    let second = app.create_community(&admin, org, "West", None, true).await;
    app.join(&member, first).await;
    app.join(&member, second).await;

    // Pending membership cannot be primary
    let (status, _) = app
        .put("/api/me/primary", Some(&member.token), json!({ "community_id": second }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .patch(
            &format!("/api/communities/{}/members/{}/status", second, member.member_id),
            Some(&admin.token),
            json!({ "status": "ACTIVE" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, list) = app
        .put("/api/me/primary", Some(&member.token), json!({ "community_id": second }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let primaries: Vec<_> = list
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["is_primary"] == true)
        .collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0]["community_id"], second.to_string());

    let (status, _) = app
        .put(
            "/api/me/primary",
            Some(&member.token),
            json!({ "community_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_update_and_public_profile() {
    let app = TestApp::new().await;
    let member = app.login("fin@example.org").await;
    let viewer = app.login("gia@example.org").await;

    let (status, me) = app
        .patch(
            "/api/me",
            Some(&member.token),
            json!({ "name": "Finley", "phone": "555-0100", "bio": "Gardener" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], "Finley");
    assert_eq!(me["phone"], "555-0100");

    let (status, _) = app
        .patch("/api/me", Some(&member.token), json!({ "bio": "x".repeat(2001) }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, me) = app
        .patch("/api/me", Some(&member.token), json!({ "phone": "" }))
        .await;
    assert!(me["phone"].is_null());

    let (status, profile) = app
        .get(&format!("/api/members/{}", member.member_id), Some(&viewer.token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["name"], "Finley");
    assert_eq!(profile["bio"], "Gardener");
    assert!(profile.get("email").is_none());
    assert!(profile.get("phone").is_none());
}

#[tokio::test]
async fn test_community_admin_grants_and_revokes() {
    let app = TestApp::new().await;
    let founder = app.login("hana@example.org").await;
    let community = setup(&app, &founder, true).await;
    let member = app.login("ivo@example.org").await;
    app.join(&member, community).await;

    let roles_uri = format!("/api/communities/{}/roles", community);

    // Pending members cannot be promoted
    let (status, _) = app
        .post(&roles_uri, Some(&founder.token), json!({ "member_id": member.member_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.patch(
        &format!("/api/communities/{}/members/{}/status", community, member.member_id),
        Some(&founder.token),
        json!({ "status": "ACTIVE" }),
    )
    .await;

    let (status, assignment) = app
        .post(&roles_uri, Some(&founder.token), json!({ "member_id": member.member_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(assignment["role"], "COMMUNITY_ADMIN");

    let (status, _) = app
        .post(&roles_uri, Some(&founder.token), json!({ "member_id": member.member_id }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Two admins: one may step down
    let (status, _) = app
        .delete(
            &format!("{}/{}", roles_uri, founder.member_id),
            Some(&member.token),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The remaining admin is the last one
    let (status, _) = app
        .delete(&format!("{}/{}", roles_uri, member.member_id), Some(&member.token))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Former admin no longer manages
    let (status, _) = app
        .post(&roles_uri, Some(&founder.token), json!({ "member_id": founder.member_id }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_super_admin_grants() {
    let app = TestApp::new().await;
    let root = app.login_super_admin().await;
    let other = app.login("jay@example.org").await;

    let (status, _) = app
        .post(
            "/api/admin/super-admins",
            Some(&other.token),
            json!({ "member_id": other.member_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .delete(&format!("/api/admin/super-admins/{}", root.member_id), Some(&root.token))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post(
            "/api/admin/super-admins",
            Some(&root.token),
            json!({ "member_id": other.member_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .delete(&format!("/api/admin/super-admins/{}", root.member_id), Some(&other.token))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .post(
            "/api/admin/super-admins",
            Some(&root.token),
            json!({ "member_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
