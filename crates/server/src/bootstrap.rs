use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crewflow_core::config::AppConfig;
use crewflow_db::{connect_with_settings, migrations, DbPool, SqlFlowRepository, SqlUserRepository};

use crate::approvals::routes;
use crate::approvals::ApprovalService;
use crate::audit::TracingAuditSink;
use crate::auth::TokenSigner;
use crate::{auth, health};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub signer: TokenSigner,
    pub approvals: Arc<ApprovalService<SqlFlowRepository, TracingAuditSink>>,
    pub users: Arc<SqlUserRepository>,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: &AppConfig) -> Self {
        Self {
            signer: TokenSigner::new(&config.auth),
            approvals: Arc::new(ApprovalService::new(
                SqlFlowRepository::new(db_pool.clone()),
                TracingAuditSink,
            )),
            users: Arc::new(SqlUserRepository::new(db_pool.clone())),
            db_pool,
        }
    }

    #[cfg(test)]
    pub fn for_tests(db_pool: DbPool) -> Self {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "handler-test-signing-secret".to_string().into();
        Self::new(db_pool, &config)
    }
}

pub struct App {
    pub config: AppConfig,
    pub state: AppState,
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<App> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await?;
    migrations::run_pending(&pool).await?;

    tracing::info!(
        event_name = "system.database.ready",
        correlation_id = "bootstrap",
        database_url = %config.database.url,
        "database connected and migrated"
    );

    let state = AppState::new(pool, &config);
    Ok(App { config, state })
}

pub fn router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    Router::new()
        .route("/health", get(health::health))
        .route("/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/approvals", post(routes::create_flow).get(routes::list_flows))
        .route("/api/approvals/pending/me", get(routes::list_pending))
        .route("/api/approvals/{id}/approve", put(routes::decide_flow))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
