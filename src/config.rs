//! Immutable configuration threaded into every component at construction.
//!
//! Nothing here is read from a global after startup: `bin/api` builds one
//! `VerifierConfig` from the environment and hands it down by `Arc`.

use serde::Serialize;
use std::time::Duration;

/// One supported chain, as advertised by `GET /chains`.
#[derive(Debug, Clone, Serialize)]
pub struct ChainConfig {
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub chain_type: String,
    #[serde(rename = "rpcUrl")]
    pub rpc_url: String,
    #[serde(rename = "contractAddress")]
    pub contract_address: String,
    #[serde(rename = "explorerUrl")]
    pub explorer_url: String,
}

/// Verifier-wide settings.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub chain: ChainConfig,
    /// Challenges issued per attempt. Blind-guess success is (1/d)^rounds.
    pub rounds: usize,
    /// Longest validity window a registration payload may claim via `exp`,
    /// seconds.
    pub registration_ttl_secs: u64,
    /// Bound on waiting for ledger confirmation before reporting a timeout.
    pub confirmation_timeout: Duration,
    /// Sweep interval for expired pots.
    pub sweep_interval: Duration,
    pub listen_addr: String,
}

impl VerifierConfig {
    /// Build from environment variables, with local-dev defaults.
    pub fn from_env() -> Self {
        let chain_id = std::env::var("CHAIN_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(102031);
        let rpc_url = std::env::var("EVM_RPC_URL")
            .unwrap_or_else(|_| "https://rpc.cc3-testnet.creditcoin.network".to_string());
        let contract_address = std::env::var("CONTRACT_ADDRESS")
            .unwrap_or_else(|_| "0x0000000000000000000000000000000000000000".to_string());
        let listen_addr =
            std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".to_string());

        Self {
            chain: ChainConfig {
                chain_id,
                name: "Creditcoin Testnet".to_string(),
                chain_type: "evm".to_string(),
                rpc_url,
                contract_address,
                explorer_url: "https://creditcoin-testnet.blockscout.com".to_string(),
            },
            rounds: 3,
            registration_ttl_secs: 3600,
            confirmation_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
            listen_addr,
        }
    }

    /// Config for tests: instant confirmations, local chain.
    pub fn local_test() -> Self {
        Self {
            chain: ChainConfig {
                chain_id: 102031,
                name: "Local Test".to_string(),
                chain_type: "evm".to_string(),
                rpc_url: "http://127.0.0.1:8545".to_string(),
                contract_address: "0x0000000000000000000000000000000000000000".to_string(),
                explorer_url: "http://127.0.0.1:8545".to_string(),
            },
            rounds: 3,
            registration_ttl_secs: 3600,
            confirmation_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_millis(200),
            listen_addr: "127.0.0.1:0".to_string(),
        }
    }
}
