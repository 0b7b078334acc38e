use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, Level};

use adopciones_server::config::Config;
use adopciones_server::notifier::SmtpNotifier;
use adopciones_server::repository::SqliteRepository;
use adopciones_server::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting adoption-request service");

    let config =
        Config::from_env().expect("Failed to load configuration from environment variables");

    let db_path = config.state_dir.join("adopciones.db");
    info!("Using state database: {}", db_path.display());
    let repository = SqliteRepository::new(&db_path).expect("Failed to initialize SQLite database");

    let notifier = SmtpNotifier::new(
        &config.smtp_host,
        &config.gmail_user,
        &config.gmail_app_password,
    )
    .expect("Failed to initialize SMTP transport");

    let state = Arc::new(AppState {
        repository: Arc::new(repository),
        notifier: Arc::new(notifier),
        staff_email: config.staff_email,
        base_url: config.base_url,
    });

    let app = app_router(state);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
