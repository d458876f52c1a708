//! Community administration server.
//!
//! Run from repo root: `cargo run -p community-admin-server`

use community_admin::{
    app, apply_migrations, ensure_database_exists, resolve, seed_defaults, AppState, Settings,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("community_admin=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect(&settings.database_url)
        .await?;

    let model = resolve(&settings.db_schema)?;
    apply_migrations(&pool, &model).await?;
    seed_defaults(&pool, &model, &settings).await?;

    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(pool, model, settings);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
