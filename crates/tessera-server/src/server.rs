use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use tessera_auth::{AuthModule, AuthStores, MemoryAuthStorage};
use tessera_auth_postgres::PostgresAuthStorage;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;

pub struct TesseraServer {
    addr: SocketAddr,
    app: Router,
    sweeper: JoinHandle<()>,
}

async fn healthz() -> &'static str {
    "ok"
}

/// Auth routes plus health check, with the HTTP middleware stack.
pub fn build_app(cfg: &AppConfig, module: &AuthModule) -> Router {
    module
        .router()
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(cfg.server.body_limit_bytes))
}

/// Opens the configured storage backend, migrating PostgreSQL if used.
pub async fn open_stores(cfg: &AppConfig) -> anyhow::Result<AuthStores> {
    match &cfg.storage.postgres {
        Some(postgres) => {
            let storage = PostgresAuthStorage::connect(postgres).await?;
            storage.migrate().await?;
            Ok(storage.stores())
        }
        None => {
            tracing::warn!("No storage.postgres configured; using in-memory storage");
            Ok(AuthStores::shared(Arc::new(MemoryAuthStorage::new())))
        }
    }
}

impl TesseraServer {
    /// Builds the services, runs the bootstrap initializers and starts the
    /// sweeper.
    pub async fn start(cfg: &AppConfig) -> anyhow::Result<Self> {
        let addr = cfg.addr().map_err(anyhow::Error::msg)?;
        let stores = open_stores(cfg).await?;
        let module = AuthModule::new(&cfg.auth, stores)?;

        let report = module.bootstrapper().run().await?;
        tracing::info!(
            admin_role = ?report.admin_role,
            admin_account = ?report.admin_account,
            permission_catalog = ?report.permission_catalog,
            inserted_permissions = report.inserted_permissions.len(),
            "Bootstrap completed"
        );

        let sweeper = Arc::new(module.sweeper()).start();
        let app = build_app(cfg, &module);

        Ok(Self { addr, app, sweeper })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        self.sweeper.abort();
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
