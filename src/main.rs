// src/main.rs
use dotenvy::dotenv;
use tracing::info;

use livepoll::config::Config;
use livepoll::db::PgPollStore;
use livepoll::memory::MemoryPollStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok(); // Load environment variables from .env file

    livepoll::init_tracing();

    let config = Config::load()?;

    match config.database_url.clone() {
        Some(database_url) => {
            let store = PgPollStore::connect(&database_url, config.db_max_connections).await?;
            info!("Connected to Postgres");
            livepoll::start_server(store, config).await?;
        }
        None => {
            livepoll::start_server(MemoryPollStore::new(), config).await?;
        }
    }

    Ok(())
}
