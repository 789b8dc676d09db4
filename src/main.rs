use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutorrito_backend::api::router;
use tutorrito_backend::email::{EmailClient, EmailConfig, NoopEmailClient, ResendHttpClient};
use tutorrito_backend::realtime::ChannelHub;
use tutorrito_backend::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tutorrito_backend=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://tutorrito.db?mode=rwc".to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let email: Arc<dyn EmailClient> = match EmailConfig::new_from_env() {
        Ok(config) => Arc::new(ResendHttpClient::new(config)?),
        Err(_) => {
            info!("RESEND_API_KEY not set, outbound email disabled");
            Arc::new(NoopEmailClient)
        }
    };

    let state = AppState {
        db: pool.clone(),
        email,
        hub: ChannelHub::new(),
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
