#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use serde_json::Value;
use tessera_auth::password::hash_password;
use tessera_auth::{
    AuthConfig, AuthModule, AuthStores, MemoryAuthStorage, Permission, PermissionStorage, Role,
    RoleStorage, SigningKeyPair, User, UserStorage,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@tessera.test";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const USER_PASSWORD: &str = "user-password";

pub struct TestApp {
    pub storage: Arc<MemoryAuthStorage>,
    pub module: AuthModule,
    pub router: Router,
}

/// One RSA key per test binary; generation dominates test time otherwise.
fn signing_key() -> SigningKeyPair {
    static PEMS: OnceLock<(String, String)> = OnceLock::new();
    let (private_pem, public_pem) = PEMS.get_or_init(|| {
        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let private_pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (private_pem.to_string(), public_pem)
    });
    SigningKeyPair::from_pem("test-key", private_pem, public_pem).unwrap()
}

pub fn config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.tokens.issuer = "https://auth.tessera.test".to_string();
    config.bootstrap.admin_email = ADMIN_EMAIL.to_string();
    config.bootstrap.admin_password = Some(ADMIN_PASSWORD.to_string());
    config
}

/// Builds the services over fresh in-memory storage and runs the bootstrap.
pub async fn app() -> TestApp {
    let storage = Arc::new(MemoryAuthStorage::new());
    let module =
        AuthModule::with_signing_key(&config(), AuthStores::shared(storage.clone()), signing_key());
    module.bootstrapper().run().await.unwrap();
    let router = module.router();

    TestApp {
        storage,
        module,
        router,
    }
}

impl TestApp {
    /// Creates a role granting the given (catalog) permission codes.
    pub async fn create_role(&self, name: &str, codes: &[&str]) -> Role {
        let mut role = Role::new(name);
        for code in codes {
            let permission = match self.storage.find_by_code(code).await.unwrap() {
                Some(permission) => permission,
                None => {
                    let permission = Permission::new(*code);
                    self.storage
                        .insert_many(std::slice::from_ref(&permission))
                        .await
                        .unwrap();
                    permission
                }
            };
            role = role.with_permission(permission);
        }
        RoleStorage::create(self.storage.as_ref(), &role)
            .await
            .unwrap();
        role
    }

    /// Creates a user holding the given roles, with [`USER_PASSWORD`].
    pub async fn create_user(&self, email: &str, roles: &[Role]) -> User {
        let mut user = User::new(email, hash_password(USER_PASSWORD).unwrap());
        for role in roles {
            user = user.with_role(role.clone());
        }
        UserStorage::create(self.storage.as_ref(), &user)
            .await
            .unwrap();
        user
    }

    /// Logs in through the service and returns the access credential.
    pub async fn access_token(&self, email: &str, password: &str) -> String {
        let request = tessera_auth::LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.module
            .auth_service()
            .login(&request)
            .await
            .unwrap()
            .access_token
    }

    pub async fn admin_token(&self) -> String {
        self.access_token(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn family(&self) -> &str {
        self.headers
            .get("x-error-family")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    with_auth(Request::get(uri), token).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str, token: Option<&str>) -> Request<Body> {
    with_auth(Request::delete(uri), token)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    json_request(Request::post(uri), token, body)
}

pub fn put_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    json_request(Request::put(uri), token, body)
}

pub fn login_request(key: Option<Uuid>, email: &str, password: &str) -> Request<Body> {
    let mut builder = Request::post("/api/auth/login");
    if let Some(key) = key {
        builder = builder.header("idempotency-key", key.to_string());
    }
    json_request(
        builder,
        None,
        &serde_json::json!({ "email": email, "password": password }),
    )
}

fn json_request(
    builder: axum::http::request::Builder,
    token: Option<&str>,
    body: &Value,
) -> Request<Body> {
    with_auth(builder, token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_auth(
    builder: axum::http::request::Builder,
    token: Option<&str>,
) -> axum::http::request::Builder {
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}
