use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use account_service::clock::{SharedClock, SystemClock};
use account_service::config::Settings;
use account_service::http::{build_router, AppState};
use account_service::security::{FederatedTokenVerifier, GoogleTokenVerifier, TokenIssuer};
use account_service::services::{AuthService, EmailService, OrganizationService};
use account_service::store::{AccountStore, OrganizationStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,account_service=debug")),
        )
        .init();

    let settings = Settings::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations applied");

    let clock: SharedClock = Arc::new(SystemClock);
    let store = Arc::new(PgStore::new(pool));
    let accounts: Arc<dyn AccountStore> = store.clone();
    let org_store: Arc<dyn OrganizationStore> = store;

    let email = EmailService::new(&settings.email)?;
    let tokens = TokenIssuer::new(&settings.jwt, clock.clone());
    let verifier: Arc<dyn FederatedTokenVerifier> = Arc::new(GoogleTokenVerifier::new(
        settings.oauth.google_client_id.clone().unwrap_or_default(),
    ));

    let auth = Arc::new(AuthService::new(
        accounts.clone(),
        org_store.clone(),
        tokens,
        verifier,
        email.clone(),
        clock.clone(),
    ));
    let orgs = Arc::new(OrganizationService::new(
        org_store,
        accounts,
        email,
        clock,
    ));

    let router = build_router(AppState { auth, orgs });

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "account-service listening");

    axum::serve(listener, router)
        .await
        .context("Server error")?;

    Ok(())
}
