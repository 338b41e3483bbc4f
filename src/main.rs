#![warn(clippy::all)]

use tracing_subscriber::fmt::format::FmtSpan;

mod config;
mod images;
mod routes;
mod store;
mod types;

#[tokio::main]
async fn main() -> Result<(), handle_errors::Error> {
    let config = crate::config::Config::new()?;

    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("poll_board={},warp=error", config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let store = store::Store::new(&config.database_url, config.max_connections).await?;

    sqlx::migrate!()
        .run(&store.clone().connection)
        .await
        .map_err(handle_errors::Error::MigrationError)?;

    let images = images::ImageStore::new(&config.upload_dir).await?;
    let auth = routes::authentication::Auth::new(
        &config.secret_key,
        &config.admin_password,
        chrono::Duration::hours(config.session_hours),
    )?;

    let routes = routes::routes(
        store,
        images,
        auth,
        config.recent_days,
        config.max_upload_bytes,
    );

    tracing::info!("poll board listening on port {}", config.port);
    warp::serve(routes).run(([0, 0, 0, 0], config.port)).await;

    Ok(())
}
