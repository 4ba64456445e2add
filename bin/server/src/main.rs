use gatehouse_platform_access::SessionStore;
use gatehouse_server::{
    auth::{
        AppState, OidcClient,
        db::{SessionRepository, UserRepository},
    },
    config::ServerConfig,
    router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let tokens = config
        .token
        .issuer()
        .expect("failed to configure token signing");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    // Cleanup expired sessions on startup
    let sessions = Arc::new(SessionRepository::new(db_pool.clone()));
    match sessions.delete_expired().await {
        Ok(count) if count > 0 => {
            tracing::info!(
                deleted_sessions = count,
                "Cleaned up expired sessions on startup"
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to cleanup expired sessions on startup");
        }
    }

    // Initialize OIDC client
    tracing::info!("Discovering OIDC provider...");
    let oidc_client = OidcClient::discover(config.oidc.clone())
        .await
        .expect("failed to discover OIDC provider");

    let app_state = Arc::new(AppState::new(
        Arc::new(oidc_client),
        Arc::new(UserRepository::new(db_pool)),
        sessions,
        tokens,
        config.oidc,
        config.session,
    ));

    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
