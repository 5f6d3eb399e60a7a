//! The router driven through `tower::ServiceExt::oneshot`.

mod common;

use axum::http::{StatusCode, header};
use serde_json::json;
use tessera_auth::RoleStorage;
use uuid::Uuid;

use common::{
    ADMIN_EMAIL, ADMIN_PASSWORD, USER_PASSWORD, app, delete, get, login_request, post_json,
    put_json,
};

#[tokio::test]
async fn jwks_is_public() {
    let app = app().await;
    let response = app.send(get("/.well-known/jwks.json", None)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["keys"][0]["alg"], "RS256");
    assert_eq!(response.body["keys"][0]["kid"], "test-key");
    assert!(response.headers.get(header::CACHE_CONTROL).is_some());
}

// =============================================================================
// Login, refresh, logout
// =============================================================================

#[tokio::test]
async fn login_requires_idempotency_key() {
    let app = app().await;
    let response = app
        .send(login_request(None, ADMIN_EMAIL, ADMIN_PASSWORD))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.family(), "validation");
    assert_eq!(response.body["errors"][0]["code"], "idempotency.key.missing");
}

#[tokio::test]
async fn login_retry_with_same_key_replays_result() {
    let app = app().await;
    let key = Uuid::new_v4();

    let first = app
        .send(login_request(Some(key), ADMIN_EMAIL, ADMIN_PASSWORD))
        .await;
    let second = app
        .send(login_request(Some(key), ADMIN_EMAIL, ADMIN_PASSWORD))
        .await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(first.body, second.body);
    assert_eq!(app.storage.idempotency_record_count().await, 1);
    assert_eq!(app.storage.refresh_token_count().await, 1);
}

#[tokio::test]
async fn failed_login_is_classified_and_not_cached() {
    let app = app().await;
    let key = Uuid::new_v4();

    let response = app
        .send(login_request(Some(key), ADMIN_EMAIL, "wrong-password"))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.family(), "authentication");
    assert_eq!(response.body["code"], "auth.bad-credentials");
    assert!(response.headers.get(header::WWW_AUTHENTICATE).is_some());

    let retry = app
        .send(login_request(Some(key), ADMIN_EMAIL, ADMIN_PASSWORD))
        .await;
    assert_eq!(retry.status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_then_logout_revokes() {
    let app = app().await;
    let login = app
        .send(login_request(Some(Uuid::new_v4()), ADMIN_EMAIL, ADMIN_PASSWORD))
        .await;
    let access = login.body["access_token"].as_str().unwrap().to_string();
    let refresh = login.body["refresh_token"].as_str().unwrap().to_string();

    let refreshed = app
        .send(post_json(
            "/api/auth/refresh",
            None,
            &json!({ "refresh_token": refresh }),
        ))
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);
    assert_eq!(refreshed.body["refresh_token"], refresh.as_str());
    assert_ne!(refreshed.body["access_token"], access.as_str());

    let logout = app
        .send(post_json("/api/auth/logout", Some(&access), &json!({})))
        .await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    assert!(logout.body.is_null());

    let after = app
        .send(post_json(
            "/api/auth/refresh",
            None,
            &json!({ "refresh_token": refresh }),
        ))
        .await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    assert_eq!(after.family(), "authentication");
    assert_eq!(after.body["code"], "jwt.refresh-token-not-found");
}

#[tokio::test]
async fn refresh_credential_is_not_an_access_credential() {
    let app = app().await;
    let login = app
        .send(login_request(Some(Uuid::new_v4()), ADMIN_EMAIL, ADMIN_PASSWORD))
        .await;
    let refresh = login.body["refresh_token"].as_str().unwrap();

    let response = app.send(get("/api/account", Some(refresh))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "jwt.unsupported");

    let response = app.send(get("/api/account", Some("garbage"))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "jwt.malformed");

    let response = app.send(get("/api/account", None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["code"], "auth.unauthorized");
}

// =============================================================================
// Account
// =============================================================================

#[tokio::test]
async fn account_and_password_change() {
    let app = app().await;
    let user = app.create_user("alice@example.com", &[]).await;
    let token = app.access_token("alice@example.com", USER_PASSWORD).await;

    let account = app.send(get("/api/account", Some(&token))).await;
    assert_eq!(account.status, StatusCode::OK);
    assert_eq!(account.body["id"], user.id.to_string());
    assert!(account.body.get("password_hash").is_none());

    let too_short = app
        .send(put_json(
            "/api/account/password",
            Some(&token),
            &json!({ "current_password": USER_PASSWORD, "new_password": "short" }),
        ))
        .await;
    assert_eq!(too_short.status, StatusCode::BAD_REQUEST);
    assert_eq!(too_short.body["errors"][0]["field"], "new_password");

    let changed = app
        .send(put_json(
            "/api/account/password",
            Some(&token),
            &json!({ "current_password": USER_PASSWORD, "new_password": "a-longer-password" }),
        ))
        .await;
    assert_eq!(changed.status, StatusCode::NO_CONTENT);

    let old = app
        .send(login_request(Some(Uuid::new_v4()), "alice@example.com", USER_PASSWORD))
        .await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Administration
// =============================================================================

#[tokio::test]
async fn forbidden_precedes_not_found() {
    let app = app().await;
    app.create_user("alice@example.com", &[]).await;
    let user_token = app.access_token("alice@example.com", USER_PASSWORD).await;
    let admin_token = app.admin_token().await;
    let missing = format!("/api/roles/{}", Uuid::new_v4());

    let as_user = app.send(delete(&missing, Some(&user_token))).await;
    assert_eq!(as_user.status, StatusCode::FORBIDDEN);
    assert_eq!(as_user.family(), "authorization");

    let as_admin = app.send(delete(&missing, Some(&admin_token))).await;
    assert_eq!(as_admin.status, StatusCode::NOT_FOUND);
    assert_eq!(as_admin.family(), "not-found");
}

#[tokio::test]
async fn permission_holder_can_list_roles_sorted() {
    let app = app().await;
    let auditor = app.create_role("AUDITOR", &["role.read.find-all"]).await;
    app.create_user("auditor@example.com", &[auditor]).await;
    let token = app.access_token("auditor@example.com", USER_PASSWORD).await;

    let response = app
        .send(get("/api/roles?sort=name,desc", Some(&token)))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let names: Vec<_> = response
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["AUDITOR", "ADMIN"]);

    let denied = app.send(get("/api/permissions", Some(&token))).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_sort_field_suggests_near_matches() {
    let app = app().await;
    let token = app.admin_token().await;

    let response = app.send(get("/api/roles?sort=nmae", Some(&token))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.family(), "query");
    assert_eq!(response.body["field"], "nmae");
    assert_eq!(response.body["suggestions"][0], "name");
}

#[tokio::test]
async fn role_creation_validates_and_rejects_duplicates() {
    let app = app().await;
    let token = app.admin_token().await;

    let invalid = app
        .send(post_json(
            "/api/roles",
            Some(&token),
            &json!({ "name": "auditor" }),
        ))
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.body["errors"][0]["field"], "name");
    assert_eq!(invalid.body["errors"][0]["code"], "role.name.pattern");

    let unknown = app
        .send(post_json(
            "/api/roles",
            Some(&token),
            &json!({ "name": "AUDITOR", "permissions": ["no.such.permission"] }),
        ))
        .await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
    assert_eq!(unknown.body["errors"][0]["code"], "role.permission.unknown");

    let created = app
        .send(post_json(
            "/api/roles",
            Some(&token),
            &json!({ "name": "AUDITOR", "permissions": ["role.read.find-all"] }),
        ))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["permissions"][0]["code"], "role.read.find-all");

    let duplicate = app
        .send(post_json(
            "/api/roles",
            Some(&token),
            &json!({ "name": "AUDITOR" }),
        ))
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.family(), "conflict");
}

#[tokio::test]
async fn referenced_role_delete_conflicts() {
    let app = app().await;
    let token = app.admin_token().await;
    let role = app.create_role("AUDITOR", &["role.read.find-all"]).await;
    app.create_user("auditor@example.com", &[role.clone()]).await;

    let before = RoleStorage::count(app.storage.as_ref()).await.unwrap();
    let response = app
        .send(delete(&format!("/api/roles/{}", role.id), Some(&token)))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(RoleStorage::count(app.storage.as_ref()).await.unwrap(), before);

    let permission = &role.permissions[0];
    let response = app
        .send(delete(
            &format!("/api/permissions/{}", permission.id),
            Some(&token),
        ))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn deactivated_listing_needs_both_permissions() {
    let app = app().await;
    let reader = app.create_role("READER", &["user.read.find-all"]).await;
    app.create_user("reader@example.com", &[reader]).await;
    let token = app.access_token("reader@example.com", USER_PASSWORD).await;

    let active = app.send(get("/api/users", Some(&token))).await;
    assert_eq!(active.status, StatusCode::OK);

    let all = app
        .send(get("/api/users?include_deactivated=true", Some(&token)))
        .await;
    assert_eq!(all.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn deactivated_user_loses_access_immediately() {
    let app = app().await;
    let admin_token = app.admin_token().await;
    let user = app.create_user("alice@example.com", &[]).await;
    let user_token = app.access_token("alice@example.com", USER_PASSWORD).await;

    let response = app
        .send(post_json(
            &format!("/api/users/{}/deactivate", user.id),
            Some(&admin_token),
            &json!({}),
        ))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["deactivated_at"].is_string());

    let response = app.send(get("/api/account", Some(&user_token))).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.family(), "authentication");
    assert_eq!(response.body["code"], "auth.account-disabled");

    let listing = app
        .send(get("/api/users?include_deactivated=true", Some(&admin_token)))
        .await;
    let emails: Vec<_> = listing
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["email"].as_str().unwrap().to_string())
        .collect();
    assert!(emails.contains(&"alice@example.com".to_string()));
}

#[tokio::test]
async fn credential_for_vanished_account_is_gone() {
    let app = app().await;
    let jwt = app.module.token_service().jwt_service();
    let claims = tessera_auth::TokenClaims::access(
        jwt.issuer(),
        Uuid::new_v4().to_string(),
        600,
        "ghost@example.com",
        Vec::new(),
    );
    let token = jwt.encode(&claims).unwrap();

    let response = app.send(get("/api/account", Some(&token))).await;
    assert_eq!(response.status, StatusCode::GONE);
    assert_eq!(response.family(), "authentication");
    assert_eq!(response.body["code"], "auth.account-not-found");
    assert!(response.headers.get(header::WWW_AUTHENTICATE).is_none());
}
