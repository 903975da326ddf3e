//! Tarefas store emulator.
//!
//! Serves the document store REST surface, live event streams and the
//! password sign-in endpoints from memory. Point the client at it with
//! `--database-url http://127.0.0.1:9000` and
//! `--auth-endpoint http://127.0.0.1:9000/identitytoolkit.googleapis.com`,
//! or run the client unconfigured to use it as the fallback REST store.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 127.0.0.1:9000
//! cargo run --bin tarefas-emulator
//!
//! # Run on custom address
//! cargo run --bin tarefas-emulator -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! EMULATOR_ADDR=127.0.0.1:8080 cargo run --bin tarefas-emulator
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tarefas_emulator::config::{EmulatorCliArgs, EmulatorConfig};
use tarefas_emulator::server::{self, EmulatorState};

#[tokio::main]
async fn main() {
    let cli = EmulatorCliArgs::parse();

    let config = match EmulatorConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting tarefas emulator");

    let state = Arc::new(EmulatorState::with_limits(
        Duration::from_secs(config.keep_alive_secs),
        Duration::from_secs(config.token_ttl_secs),
    ));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "emulator listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "emulator server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start emulator");
            std::process::exit(1);
        }
    }
}
