use anyhow::{Context, Result};
use clap::Parser;
use log::debug;

use nurse_booking::cli::{commands::handle_cli, Cli};
use nurse_booking::config::Config;
use nurse_booking::db;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let pool = db::init_pool(&config.database_url, config.max_connections)
        .await
        .context("Failed to connect to database")?;
    debug!("Connected with up to {} connections", config.max_connections);

    handle_cli(cli, pool, &config).await
}
