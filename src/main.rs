#![cfg(not(tarpaulin_include))]

use excel_analytics::app;
use excel_analytics::config::Config;

/// Main entry point for the analytics server
///
/// Initializes logging (`RUST_LOG` overrides the default `info` level), loads the
/// configuration from `.env` and the environment, and runs the HTTP server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    app::run(config).await
}
