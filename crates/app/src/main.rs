mod customers;
mod problem;
mod records;
mod reports;
mod router;
mod sales;
mod seed;
mod session;
mod telemetry;

use std::net::SocketAddr;

use chrono::Utc;
use tracing::info;

use crm_storage::Database;
use crm_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    if config.seed_demo_data {
        seed::seed_demo_data(&database, Utc::now()).await?;
    }

    let sessions = session::SessionKeys::new(&config.session_secret, config.session_ttl)?;
    let state = router::AppState::new(metrics, database, sessions, config.demo_user.clone());

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
