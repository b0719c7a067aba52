//! Web API permission and share tests
//!
//! Integration tests for `/permissions`, `/shares` and `/session`.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{allow_user, TestApp, SESSION};
use driveshed::Permission;

#[tokio::test]
async fn test_permission_records_roundtrip() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    app.upload(&admin, "/team/plan.txt", b"plan").await;

    let response = app
        .server
        .put("/permissions/team")
        .add_header(SESSION, admin.clone())
        .json(&json!([
            { "object_type": "group", "object_id": "staff", "allow": ["read", "create"] },
            { "object_type": "everyone", "deny": ["delete"] }
        ]))
        .await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["data"]["path"], "/team");
    assert_eq!(body["data"]["records"].as_array().unwrap().len(), 2);

    let carol = app.login("carol", &["staff"]).await;
    let response = app
        .server
        .get("/permissions/team")
        .add_header(SESSION, carol.clone())
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["effective"], json!(["read", "create"]));

    // Read is enough to download, not to change records.
    app.server
        .get("/files/team/plan.txt")
        .add_header(SESSION, carol.clone())
        .await
        .assert_status_ok();
    app.server
        .put("/permissions/team")
        .add_header(SESSION, carol)
        .json(&json!([]))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_permission_name_is_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin().await;

    let response = app
        .server
        .put("/permissions/x")
        .add_header(SESSION, admin)
        .json(&json!([{ "object_type": "user", "object_id": "bob", "allow": ["fly"] }]))
        .await;
    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_root_permissions() {
    let app = TestApp::new().await;
    let admin = app.admin().await;

    app.server
        .put("/permissions")
        .add_header(SESSION, admin.clone())
        .json(&json!([{ "object_type": "group", "object_id": "guest", "allow": ["read"] }]))
        .await
        .assert_status_ok();
    app.upload(&admin, "/pub.txt", b"public").await;

    // Guests now read through the root record.
    let response = app.server.get("/files/pub.txt").await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"public");
}

#[tokio::test]
async fn test_share_lifecycle() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    app.upload(&admin, "/pub/a.txt", b"alpha").await;

    let alice = app.login("alice", &[]).await;
    app.grant(allow_user("/pub", "alice", Permission::Read | Permission::Share))
        .await;

    let response = app
        .server
        .post("/shares")
        .add_header(SESSION, alice.clone())
        .json(&json!({ "path": "/pub", "permissions": ["read"] }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let share = response.json::<Value>()["data"].clone();
    let id = share["id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 8);
    assert_eq!(share["permissions"], json!(["read"]));

    // Anyone holding the id can open it and download.
    let response = app.server.get(&format!("/shares/{id}")).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["files"][0]["path"], "/pub/a.txt");

    let response = app.server.get(&format!("/shares/{id}/files/pub/a.txt")).await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"alpha");

    let response = app
        .server
        .get("/shares")
        .add_header(SESSION, alice.clone())
        .await;
    assert_eq!(response.json::<Value>()["data"].as_array().unwrap().len(), 1);

    let mallory = app.login("mallory", &[]).await;
    app.server
        .delete(&format!("/shares/{id}"))
        .add_header(SESSION, mallory)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .delete(&format!("/shares/{id}"))
        .add_header(SESSION, alice)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .get(&format!("/shares/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_share_cannot_exceed_issuer() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    app.upload(&admin, "/pub/a.txt", b"alpha").await;

    let alice = app.login("alice", &[]).await;
    app.grant(allow_user("/pub", "alice", Permission::Read | Permission::Share))
        .await;

    let response = app
        .server
        .post("/shares")
        .add_header(SESSION, alice)
        .json(&json!({ "path": "/pub", "permissions": ["read", "delete"] }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_session_endpoints() {
    let app = TestApp::new().await;

    let response = app.server.get("/session").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["guest"], true);

    let alice = app.login("alice", &["staff"]).await;
    let response = app.server.get("/session").add_header(SESSION, alice.clone()).await;
    let body = response.json::<Value>();
    assert_eq!(body["data"]["subject"], "alice");
    assert_eq!(body["data"]["groups"], json!(["staff"]));

    app.server
        .delete("/session")
        .add_header("cookie", format!("session={alice}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .get("/session")
        .add_header(SESSION, alice)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_owner_keeps_full_access() {
    let app = TestApp::new().await;
    let alice = app.login("alice", &[]).await;
    app.grant(allow_user("/home/alice", "alice", Permission::Create.into()))
        .await;

    app.upload(&alice, "/home/alice/notes.txt", b"mine")
        .await
        .assert_status(StatusCode::CREATED);

    // Only Create was granted, yet the owner may read and delete its file.
    app.server
        .get("/files/home/alice/notes.txt")
        .add_header(SESSION, alice.clone())
        .await
        .assert_status_ok();
    app.server
        .delete("/files/home/alice/notes.txt")
        .add_header(SESSION, alice)
        .await
        .assert_status_ok();
}
