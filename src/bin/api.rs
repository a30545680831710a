//! Money pot verifier service.
//!
//! Usage:
//!   cargo run --bin api
//!
//! Configuration comes from the environment once at startup (CHAIN_ID,
//! EVM_RPC_URL, CONTRACT_ADDRESS, LISTEN_ADDR) and is threaded through as an
//! immutable value; nothing reads globals after this point.

use money_pot_lab::api::{AppState, build_router};
use money_pot_lab::config::VerifierConfig;
use money_pot_lab::protocol::ledger::MemoryLedger;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = VerifierConfig::from_env();
    let listen_addr = config.listen_addr.clone();
    tracing::info!(
        chain_id = config.chain.chain_id,
        chain = %config.chain.name,
        contract = %config.chain.contract_address,
        rounds = config.rounds,
        "verifier configured"
    );

    let ledger = Arc::new(MemoryLedger::new());
    let state = AppState::new(config, ledger);
    state.spawn_sweeper();

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "listening");
    tracing::info!("  GET  /health                 Service health");
    tracing::info!("  GET  /chains                 Supported chain configs");
    tracing::info!("  POST /register/options       Color/direction alphabets + session legend");
    tracing::info!("  POST /register/verify        Creator-signed pot registration");
    tracing::info!("  POST /authenticate/options   Hunter-signed challenge issuance");
    tracing::info!("  POST /authenticate/verify    Hunter-signed answer scoring");
    tracing::info!("  GET/DELETE /debug/pot/{{id}}   Registration diagnostics");

    axum::serve(listener, app).await?;

    Ok(())
}
