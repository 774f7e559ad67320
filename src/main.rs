use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod courses;
mod db;
mod enrollment;
mod error;
mod lifecycle;
mod models;
mod notify;
mod progress;
mod routes;
mod secret;
mod service;
mod store;

use config::Config;
use notify::Notifier;
use secret::KeyHasher;
use service::Service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "coursegate=info,axum=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect(&cfg.database_url).await?;

    let notifier = match &cfg.notify_webhook_url {
        Some(url) => Notifier::webhook(url.as_str())?,
        None => Notifier::Log,
    };
    let svc = Service::new(pool, notifier, KeyHasher::default(), cfg.min_key_len);

    if let Some(username) = &cfg.admin_username {
        let admin = svc.ensure_admin(username).await?;
        tracing::info!(admin_id=%admin.id, %username, "bootstrap administrator ready");
    }

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(svc))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
