//! Photosocial server

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use photosocial::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db::{
        self,
        repositories::{SqlxChatRepository, SqlxVerificationRepository},
    },
    services::{
        jobs::{spawn_maintenance, spawn_rate_limiter_cleanup},
        EmailService, JobQueue,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photosocial=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Photosocial...");

    let config = Config::load_with_env(Path::new("config.yml"))?;
    if config.auth.uses_default_secret() {
        tracing::warn!("auth.secret_key is the built-in default; set PHOTOSOCIAL_AUTH_SECRET_KEY");
    }
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cache = create_cache(&config.cache).await?;
    tracing::info!("Cache initialized");

    let email = Arc::new(EmailService::new(
        config.email.clone(),
        &config.app,
        config.auth.verification_code_expire_minutes,
        config.auth.password_reset_expire_minutes,
    ));
    if !email.is_configured() {
        tracing::warn!("SMTP is not configured, outgoing mail will only be logged");
    }
    let (jobs, _worker) = JobQueue::start(email);

    let _maintenance = spawn_maintenance(
        SqlxChatRepository::boxed(pool.clone()),
        SqlxVerificationRepository::boxed(pool.clone()),
        &config.chat,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, pool, cache, jobs);
    state.images.ensure_dirs().await?;
    let _limiter_cleanup = spawn_rate_limiter_cleanup(state.rate_limiter.clone());

    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
