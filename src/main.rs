use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use login_gateway::cli::{account::handle_account_command, Cli};
use login_gateway::config::GatewayConfig;
use login_gateway::login_server::LoginServer;
use login_gateway::storage::SledStore;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let created = !std::path::Path::new(&cli.config).exists();
    let loaded = GatewayConfig::load_or_create(&cli.config);
    let level = match &loaded {
        Ok(config) => config.logging.level.clone(),
        Err(_) => "info".to_string(),
    };

    // RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // An existing config that fails to load is fatal; defaults could switch the hashing mode
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if created {
        info!("Config file not found at '{}'. Wrote defaults.", cli.config);
    }

    let store = match SledStore::open(&config.storage.path, &config.storage.login_database) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open store at '{}': {}", config.storage.path, e);
            return ExitCode::FAILURE;
        }
    };
    let server = LoginServer::new(store.clone(), &config);

    let result = handle_account_command(&server, &config, cli.command);
    if let Err(e) = store.flush() {
        error!("Failed to flush store: {}", e);
        return ExitCode::FAILURE;
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}
