//! End-to-end behavior of the token lifecycle, idempotency executor,
//! permission catalog and authorization engine over in-memory storage.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tessera_auth::rbac::catalog::{CatalogRegion, PermissionDeclaration};
use tessera_auth::{
    AuthError, IdempotencyExecutor, PermissionCatalog, PermissionRegistry, PermissionStorage,
    RefreshTokenStorage, RoleStorage, SigningKeyPair, TokenClaims, TokenService, TokenType,
    UserStorage,
};
use tessera_auth::token::TokenConfig;
use time::Duration;
use uuid::Uuid;

use common::{USER_PASSWORD, app};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Outcome {
    v: u32,
}

// =============================================================================
// Token lifecycle
// =============================================================================

#[tokio::test]
async fn issued_access_credential_verifies_until_it_expires() {
    let app = app().await;
    let user = app.create_user("alice@example.com", &[]).await;
    let tokens = TokenService::new(
        app.module.token_service().jwt_service().clone(),
        app.storage.clone(),
        app.storage.clone(),
        TokenConfig::default()
            .with_access_token_lifetime(Duration::seconds(1))
            .with_refresh_token_lifetime(Duration::seconds(60)),
    );

    let pair = tokens.issue_pair(&user).await.unwrap();
    let access = tokens.verify(&pair.access_token, TokenType::Access).unwrap();
    assert_eq!(access.sub, user.id.to_string());
    assert_eq!(access.token_type, TokenType::Access);
    assert_eq!(access.exp - access.iat, 1);

    let refresh = tokens
        .verify(&pair.refresh_token, TokenType::Refresh)
        .unwrap();
    assert_eq!(refresh.exp - refresh.iat, 60);
    let stored = app
        .storage
        .find_by_token(&pair.refresh_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.expires_at.unix_timestamp(), refresh.exp);

    // Whole-second claims: two seconds always pass `exp`.
    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;

    let err = tokens
        .verify(&pair.access_token, TokenType::Access)
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenExpired));
    tokens
        .verify(&pair.refresh_token, TokenType::Refresh)
        .unwrap();
}

#[tokio::test]
async fn module_lifetimes_follow_configuration() {
    let app = app().await;
    let user = app.create_user("alice@example.com", &[]).await;
    let tokens = app.module.token_service();
    let settings = common::config().tokens;

    let pair = tokens.issue_pair(&user).await.unwrap();
    let access = tokens.verify(&pair.access_token, TokenType::Access).unwrap();
    let refresh = tokens
        .verify(&pair.refresh_token, TokenType::Refresh)
        .unwrap();

    assert_eq!(
        access.exp - access.iat,
        settings.access_token_lifetime.as_secs() as i64
    );
    assert_eq!(
        refresh.exp - refresh.iat,
        settings.refresh_token_lifetime.as_secs() as i64
    );
}

#[tokio::test]
async fn refresh_echoes_refresh_credential_with_new_access() {
    let app = app().await;
    let user = app.create_user("alice@example.com", &[]).await;
    let tokens = app.module.token_service();

    let pair = tokens.issue_pair(&user).await.unwrap();
    let refreshed = tokens.refresh(&pair.refresh_token).await.unwrap();

    assert_eq!(refreshed.refresh_token, pair.refresh_token);
    assert_ne!(refreshed.access_token, pair.access_token);
    tokens
        .verify(&refreshed.access_token, TokenType::Access)
        .unwrap();
}

#[tokio::test]
async fn refresh_of_unissued_credential_is_a_classified_failure() {
    let app = app().await;
    let user = app.create_user("alice@example.com", &[]).await;
    let tokens = app.module.token_service();

    // Validly signed, never persisted.
    let claims = TokenClaims::refresh(tokens.jwt_service().issuer(), user.id.to_string(), 3600);
    let unissued = tokens.jwt_service().encode(&claims).unwrap();
    let err = tokens.refresh(&unissued).await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshTokenNotFound));
    assert!(err.is_token_error());

    let err = tokens.refresh("not-a-jwt").await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedToken { .. }));

    let pair = tokens.issue_pair(&user).await.unwrap();
    let err = tokens.refresh(&pair.access_token).await.unwrap_err();
    assert!(matches!(err, AuthError::UnsupportedToken { .. }));
}

#[tokio::test]
async fn credential_signed_by_another_key_fails_signature_check() {
    let app = app().await;
    let user = app.create_user("alice@example.com", &[]).await;
    let tokens = app.module.token_service();

    let foreign = tessera_auth::JwtService::new(
        SigningKeyPair::generate_rsa("foreign").unwrap(),
        tokens.jwt_service().issuer(),
    );
    let claims = TokenClaims::refresh(foreign.issuer(), user.id.to_string(), 3600);
    let forged = foreign.encode(&claims).unwrap();

    let err = tokens.refresh(&forged).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidSignature));
}

#[tokio::test]
async fn revoke_all_invalidates_every_refresh_credential() {
    let app = app().await;
    let user = app.create_user("alice@example.com", &[]).await;
    let tokens = app.module.token_service();

    let first = tokens.issue_pair(&user).await.unwrap();
    let second = tokens.issue_pair(&user).await.unwrap();
    assert_eq!(tokens.revoke_all(user.id).await.unwrap(), 2);

    for pair in [first, second] {
        let err = tokens.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshTokenNotFound));
    }
}

#[tokio::test]
async fn deactivation_revokes_and_blocks_the_principal() {
    let app = app().await;
    let user = app.create_user("alice@example.com", &[]).await;
    let tokens = app.module.token_service();
    let pair = tokens.issue_pair(&user).await.unwrap();

    app.module.auth_service().deactivate(user.id).await.unwrap();

    let err = tokens.refresh(&pair.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshTokenNotFound));

    // Access credential still verifies; the principal reload rejects it.
    tokens.verify(&pair.access_token, TokenType::Access).unwrap();
    let err = app.module.engine().load_principal(user.id).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountDisabled));

    let login = tessera_auth::LoginRequest {
        email: "alice@example.com".to_string(),
        password: USER_PASSWORD.to_string(),
    };
    let err = app.module.auth_service().login(&login).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountDisabled));
}

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn wrap_with_same_key_runs_operation_once() {
    let app = app().await;
    let executor = app.module.idempotency();
    let key = Uuid::new_v4();
    let count = AtomicUsize::new(0);

    let mut results = Vec::new();
    for _ in 0..2 {
        let result = executor
            .wrap(key, || async {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(Outcome { v: 1 })
            })
            .await
            .unwrap();
        results.push(result);
    }

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(results, vec![Outcome { v: 1 }, Outcome { v: 1 }]);
}

#[tokio::test]
async fn distinct_keys_run_independently() {
    let app = app().await;
    let executor = app.module.idempotency();
    let count = AtomicUsize::new(0);

    for v in 0..3 {
        let result = executor
            .wrap(Uuid::new_v4(), || async {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(Outcome { v })
            })
            .await
            .unwrap();
        assert_eq!(result, Outcome { v });
    }
    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert_eq!(app.storage.idempotency_record_count().await, 3);
}

#[tokio::test]
async fn record_past_ttl_is_not_replayed() {
    let app = app().await;
    let executor = IdempotencyExecutor::new(
        app.storage.clone(),
        std::time::Duration::from_millis(1),
    );
    let key = Uuid::new_v4();

    executor.wrap(key, || async { Ok(Outcome { v: 1 }) }).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let second = executor
        .wrap(key, || async { Ok(Outcome { v: 2 }) })
        .await
        .unwrap();
    assert_eq!(second, Outcome { v: 2 });
}

// =============================================================================
// Permission catalog
// =============================================================================

const SCENARIO: CatalogRegion = CatalogRegion {
    name: "scenario",
    permissions: &[
        PermissionDeclaration::new("role.read.find-all", "List roles"),
        PermissionDeclaration::new("user.create", "Create users"),
    ],
};

#[tokio::test]
async fn reconciliation_inserts_exactly_the_missing_codes() {
    let storage = Arc::new(tessera_auth::MemoryAuthStorage::new());
    storage
        .insert_many(&[tessera_auth::Permission::new("user.create")])
        .await
        .unwrap();
    let catalog = PermissionCatalog::new(
        PermissionRegistry::new().with_region(SCENARIO),
        storage.clone(),
    );

    let inserted: Vec<String> = catalog
        .synchronize()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.code)
        .collect();
    assert_eq!(inserted, vec!["role.read.find-all"]);

    assert!(catalog.synchronize().await.unwrap().is_empty());
    assert_eq!(PermissionStorage::count(storage.as_ref()).await.unwrap(), 2);
}

#[tokio::test]
async fn referenced_rows_cannot_be_deleted() {
    let app = app().await;
    let role = app.create_role("AUDITOR", &["role.read.find-all"]).await;
    app.create_user("alice@example.com", &[role.clone()]).await;

    let roles_before = RoleStorage::count(app.storage.as_ref()).await.unwrap();
    let err = RoleStorage::delete(app.storage.as_ref(), role.id)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        RoleStorage::count(app.storage.as_ref()).await.unwrap(),
        roles_before
    );

    let permission = role.permissions[0].clone();
    let permissions_before = PermissionStorage::count(app.storage.as_ref()).await.unwrap();
    let err = PermissionStorage::delete(app.storage.as_ref(), permission.id)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        PermissionStorage::count(app.storage.as_ref()).await.unwrap(),
        permissions_before
    );
}

// =============================================================================
// Authorization engine
// =============================================================================

#[tokio::test]
async fn admin_passes_every_gate_and_others_need_the_permission() {
    let app = app().await;
    let engine = app.module.engine();

    let admin = app
        .storage
        .find_by_email_with_roles(common::ADMIN_EMAIL)
        .await
        .unwrap()
        .unwrap();
    let admin = engine.load_principal(admin.id).await.unwrap();
    assert!(engine.is_admin(&admin));

    let auditor_role = app.create_role("AUDITOR", &["role.read.find-all"]).await;
    let auditor = app
        .create_user("auditor@example.com", &[auditor_role])
        .await;
    let auditor = engine.load_principal(auditor.id).await.unwrap();
    let nobody = app.create_user("nobody@example.com", &[]).await;
    let nobody = engine.load_principal(nobody.id).await.unwrap();

    for permission in tessera_auth::permission_registry().resolve_declared_permissions() {
        assert!(engine.is_admin_or_has_permission(&admin, permission.code));
        assert!(!engine.is_admin_or_has_permission(&nobody, permission.code));
        assert_eq!(
            engine.is_admin_or_has_permission(&auditor, permission.code),
            permission.code == "role.read.find-all"
        );
    }
}

#[tokio::test]
async fn authorization_uses_live_roles_not_credential_claims() {
    let app = app().await;
    let role = app.create_role("AUDITOR", &["role.read.find-all"]).await;
    let user = app.create_user("alice@example.com", &[]).await;
    let tokens = app.module.token_service();

    let pair = tokens.issue_pair(&user).await.unwrap();
    let claims = tokens.verify(&pair.access_token, TokenType::Access).unwrap();
    assert!(claims.authorities.is_empty());

    app.storage.assign_role(user.id, role.id).await.unwrap();

    let principal = app.module.engine().load_principal(user.id).await.unwrap();
    assert!(
        app.module
            .engine()
            .has_authority(&principal, "role.read.find-all")
    );
}
