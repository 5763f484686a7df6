use std::process::ExitCode;

use econ_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use econ_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logging comes up before command dispatch; commands reload config with
    // their own overrides applied.
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => init_logging(&config),
        Err(_) => init_logging(&AppConfig::default()),
    }

    econ_cli::run().await
}
