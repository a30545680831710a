//! REST API types and router for the money pot verifier.
//!
//! This module contains the shared state, handlers, and router builder used
//! by the `api` binary and integration tests. All POST bodies carry the
//! `{encrypted_payload, signature}` envelope; see `protocol::wallet` for the
//! byte-exact signing rules.

use crate::config::{ChainConfig, VerifierConfig};
use crate::protocol::attempt::AttemptAuthenticator;
use crate::protocol::error::PotError;
use crate::protocol::ledger::{MemoryLedger, PotId};
use crate::protocol::legend::{Color, Direction, Legend, LegendRegistry};
use crate::protocol::pot::{PotManager, Registration, RegisterOutcome, start_sweeper};
use crate::protocol::wallet::SignedEnvelope;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ─── App State ───────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<VerifierConfig>,
    pub ledger: Arc<MemoryLedger>,
    pub pots: Arc<PotManager>,
    pub attempts: Arc<AttemptAuthenticator>,
    pub legends: Arc<LegendRegistry>,
}

impl AppState {
    /// Wire up the full component graph around one ledger.
    pub fn new(config: VerifierConfig, ledger: Arc<MemoryLedger>) -> Self {
        let config = Arc::new(config);
        let pots = Arc::new(PotManager::new(ledger.clone(), config.clone()));
        let attempts = Arc::new(AttemptAuthenticator::new(
            ledger.clone(),
            pots.clone(),
            config.clone(),
        ));
        Self {
            config,
            ledger,
            pots,
            attempts,
            legends: Arc::new(LegendRegistry::new()),
        }
    }

    /// Spawn the background expiry sweeper for this state.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        start_sweeper(self.pots.clone(), self.config.sweep_interval)
    }
}

// ─── Request / Response DTOs ─────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ChainsResponse {
    #[serde(rename = "supportedChains")]
    supported_chains: Vec<ChainConfig>,
}

#[derive(Deserialize, Default)]
struct RegisterOptionsReq {
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct RegisterOptionsResponse {
    session_id: String,
    colors: BTreeMap<&'static str, &'static str>,
    directions: BTreeMap<&'static str, &'static str>,
    legend: Legend,
}

#[derive(Serialize)]
struct RegisterVerifyResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'static str>,
}

#[derive(Serialize)]
struct VerifyResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'static str>,
}

#[derive(Serialize)]
struct DebugPotResponse {
    registration: Registration,
}

#[derive(Serialize)]
struct DeleteResponse {
    deleted: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ─── Error helpers ───────────────────────────────────────────

type ApiResult<T> = Result<(StatusCode, Json<T>), (StatusCode, Json<ErrorResponse>)>;

fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse { error: msg.into() }),
    )
}

fn not_found(msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse { error: msg.into() }),
    )
}

/// Map a protocol error onto the HTTP taxonomy.
fn protocol_error(e: PotError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        PotError::Auth(_) => StatusCode::UNAUTHORIZED,
        PotError::Expired { .. } => StatusCode::GONE,
        PotError::NotFound { .. } => StatusCode::NOT_FOUND,
        PotError::InvalidState { .. } => StatusCode::CONFLICT,
        PotError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        PotError::Ledger(_) => StatusCode::BAD_GATEWAY,
        PotError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    };
    (
        status,
        Json(ErrorResponse {
            error: format!("{e}"),
        }),
    )
}

// ─── GET /health ─────────────────────────────────────────────

async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            service: "money-pot-verifier",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

// ─── GET /chains ─────────────────────────────────────────────

async fn chains(State(state): State<AppState>) -> (StatusCode, Json<ChainsResponse>) {
    (
        StatusCode::OK,
        Json(ChainsResponse {
            supported_chains: vec![state.config.chain.clone()],
        }),
    )
}

// ─── POST /register/options ──────────────────────────────────

async fn register_options(
    State(state): State<AppState>,
    body: Option<Json<RegisterOptionsReq>>,
) -> (StatusCode, Json<RegisterOptionsResponse>) {
    let session_id = body
        .and_then(|Json(req)| req.session_id)
        .unwrap_or_else(|| "default".to_string());
    let legend = state.legends.issue(&session_id);

    let colors = Color::ALL.iter().map(|c| (c.as_str(), c.swatch())).collect();
    let directions = [
        ("up", Direction::Up),
        ("down", Direction::Down),
        ("left", Direction::Left),
        ("right", Direction::Right),
        ("stay", Direction::Stay),
    ]
    .into_iter()
    .map(|(name, d)| (name, d.symbol()))
    .collect();

    (
        StatusCode::OK,
        Json(RegisterOptionsResponse {
            session_id,
            colors,
            directions,
            legend: *legend,
        }),
    )
}

// ─── POST /register/verify ───────────────────────────────────

async fn register_verify(
    State(state): State<AppState>,
    Json(envelope): Json<SignedEnvelope>,
) -> ApiResult<RegisterVerifyResponse> {
    match state.pots.register(&envelope).await {
        Ok(RegisterOutcome::Registered) => Ok((
            StatusCode::CREATED,
            Json(RegisterVerifyResponse {
                status: "registered",
                note: None,
            }),
        )),
        // Idempotent duplicate: success-with-note so client retries are safe.
        Ok(RegisterOutcome::AlreadyRegistered) => Ok((
            StatusCode::OK,
            Json(RegisterVerifyResponse {
                status: "already registered",
                note: Some("existing registration retained"),
            }),
        )),
        Err(e) => Err(protocol_error(e)),
    }
}

// ─── POST /authenticate/options ──────────────────────────────

async fn authenticate_options(
    State(state): State<AppState>,
    Json(envelope): Json<SignedEnvelope>,
) -> ApiResult<crate::protocol::attempt::IssuedChallenges> {
    match state.attempts.issue_challenges(&envelope).await {
        Ok(issued) => Ok((StatusCode::OK, Json(issued))),
        Err(e) => Err(protocol_error(e)),
    }
}

// ─── POST /authenticate/verify ───────────────────────────────

async fn authenticate_verify(
    State(state): State<AppState>,
    Json(envelope): Json<SignedEnvelope>,
) -> ApiResult<VerifyResponse> {
    match state.attempts.verify_answers(&envelope).await {
        Ok(outcome) => Ok((
            StatusCode::OK,
            Json(VerifyResponse {
                success: outcome.success,
                note: outcome
                    .already_settled
                    .then_some("attempt already settled; reporting original outcome"),
            }),
        )),
        Err(e) => Err(protocol_error(e)),
    }
}

// ─── GET /debug/pot/{id} ─────────────────────────────────────

async fn debug_get_pot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DebugPotResponse> {
    let pot_id: PotId = id
        .parse()
        .map_err(|_| bad_request(format!("invalid pot id {id:?}")))?;
    match state.pots.registration(pot_id).await {
        Some(registration) => Ok((StatusCode::OK, Json(DebugPotResponse { registration }))),
        None => Err(not_found(format!("no registration for pot {pot_id}"))),
    }
}

// ─── DELETE /debug/pot/{id} ──────────────────────────────────

async fn debug_delete_pot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DeleteResponse> {
    let pot_id: PotId = id
        .parse()
        .map_err(|_| bad_request(format!("invalid pot id {id:?}")))?;
    let deleted = state.pots.remove_registration(pot_id).await;
    Ok((StatusCode::OK, Json(DeleteResponse { deleted })))
}

// ─── Router builder ──────────────────────────────────────────

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chains", get(chains))
        .route("/register/options", post(register_options))
        .route("/register/verify", post(register_verify))
        .route("/authenticate/options", post(authenticate_options))
        .route("/authenticate/verify", post(authenticate_verify))
        .route("/debug/pot/{id}", get(debug_get_pot).delete(debug_delete_pot))
        .with_state(state)
}
