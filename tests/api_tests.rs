//! HTTP-level tests: the full router exercised through `oneshot`, with real
//! signed envelopes on every POST body.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use money_pot_lab::api::{AppState, build_router};
use money_pot_lab::config::VerifierConfig;
use money_pot_lab::protocol::attempt::{AttemptOptionsPayload, AttemptVerifyPayload};
use money_pot_lab::protocol::ledger::{MemoryLedger, PotId, PotStatus};
use money_pot_lab::protocol::legend::{Direction, Legend};
use money_pot_lab::protocol::pot::RegisterPayload;
use money_pot_lab::protocol::unix_now;
use money_pot_lab::protocol::wallet::SignedEnvelope;
use money_pot_lab::{Address, generate_keypair};
use secp256k1::Keypair;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const CHAIN_ID: u64 = 102031;

// ─── Test helpers ───────────────────────────────────────────

struct App {
    router: Router,
    state: AppState,
    creator_kp: Keypair,
    creator: Address,
    hunter_kp: Keypair,
    hunter: Address,
}

async fn app() -> App {
    let ledger = Arc::new(MemoryLedger::new());
    let state = AppState::new(VerifierConfig::local_test(), ledger.clone());
    let router = build_router(state.clone());
    let (creator_kp, creator) = generate_keypair();
    let (hunter_kp, hunter) = generate_keypair();
    ledger.credit(creator, 10_000).await;
    ledger.credit(hunter, 10_000).await;
    App {
        router,
        state,
        creator_kp,
        creator,
        hunter_kp,
        hunter,
    }
}

async fn get_json(router: &Router, path: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn post_json(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn delete_json(router: &Router, path: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn envelope_body(envelope: &SignedEnvelope) -> Value {
    serde_json::to_value(envelope).unwrap()
}

fn demo_legend() -> Legend {
    Legend::new(
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    )
    .unwrap()
}

fn register_payload(pot_id: PotId, issuer: Address) -> RegisterPayload {
    let now = unix_now();
    RegisterPayload {
        pot_id: pot_id.to_string(),
        password: "A".to_string(),
        legend: demo_legend(),
        iat: now,
        iss: issuer,
        exp: now + 3600,
        chain_id: CHAIN_ID,
    }
}

async fn create_pot(app: &App) -> PotId {
    app.state
        .pots
        .create_pot(app.creator, 1000, 360, 100, None)
        .await
        .unwrap()
}

async fn register_pot(app: &App) -> PotId {
    let pot_id = create_pot(app).await;
    let payload = register_payload(pot_id, app.creator);
    let envelope = SignedEnvelope::seal_value(&payload, &app.creator_kp).unwrap();
    let (status, _) = post_json(&app.router, "/register/verify", envelope_body(&envelope)).await;
    assert_eq!(status, StatusCode::CREATED);
    pot_id
}

/// Issue challenges over HTTP; returns (challenge_id, challenges JSON).
async fn issue_challenges(app: &App, attempt_id: u64) -> (String, Vec<Value>) {
    let payload = AttemptOptionsPayload {
        attempt_id: attempt_id.to_string(),
        chain_id: CHAIN_ID,
    };
    let envelope =
        SignedEnvelope::seal_with_message(&payload, &payload.attempt_id, &app.hunter_kp).unwrap();
    let (status, body) =
        post_json(&app.router, "/authenticate/options", envelope_body(&envelope)).await;
    assert_eq!(status, StatusCode::OK, "issue failed: {body}");
    let challenge_id = body["challenge_id"].as_str().unwrap().to_string();
    let challenges = body["challenges"].as_array().unwrap().clone();
    (challenge_id, challenges)
}

/// Compose each round's color groups with the legend to find the directions
/// a genuine password-holder would answer.
fn solve(challenges: &[Value], password: char, legend: &Legend) -> Vec<String> {
    challenges
        .iter()
        .map(|c| {
            let groups = c["colorGroups"].as_object().unwrap();
            let color = groups
                .iter()
                .find(|(_, chars)| chars.as_str().unwrap().contains(password))
                .map(|(name, _)| name.clone())
                .expect("password must appear in one group");
            let dir = match color.as_str() {
                "red" => legend.red,
                "green" => legend.green,
                "blue" => legend.blue,
                "yellow" => legend.yellow,
                other => panic!("unknown color {other}"),
            };
            dir.symbol().to_string()
        })
        .collect()
}

async fn submit_answers(
    app: &App,
    challenge_id: &str,
    solutions: Vec<String>,
) -> (StatusCode, Value) {
    let payload = AttemptVerifyPayload {
        challenge_id: challenge_id.to_string(),
        solutions,
        chain_id: CHAIN_ID,
    };
    let envelope =
        SignedEnvelope::seal_with_message(&payload, challenge_id, &app.hunter_kp).unwrap();
    post_json(&app.router, "/authenticate/verify", envelope_body(&envelope)).await
}

// ─── Discovery endpoints ────────────────────────────────────

#[tokio::test]
async fn health_reports_service() {
    let app = app().await;
    let (status, body) = get_json(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "money-pot-verifier");
}

#[tokio::test]
async fn chains_advertises_configured_chain() {
    let app = app().await;
    let (status, body) = get_json(&app.router, "/chains").await;
    assert_eq!(status, StatusCode::OK);
    let chains = body["supportedChains"].as_array().unwrap();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0]["chainId"], CHAIN_ID);
    assert_eq!(chains[0]["type"], "evm");
}

// ─── /register/options ──────────────────────────────────────

#[tokio::test]
async fn register_options_defaults_session_and_reuses_legend() {
    let app = app().await;
    let (status, first) = post_json(&app.router, "/register/options", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["session_id"], "default");
    assert_eq!(first["colors"]["red"], "#ef4444");
    assert_eq!(first["directions"]["stay"], "S");

    // Same session asks again: the legend must come back unchanged.
    let (_, second) = post_json(&app.router, "/register/options", json!({})).await;
    assert_eq!(first["legend"], second["legend"]);

    // And it holds per named session too.
    let body = json!({"session_id": "alice"});
    let (_, a1) = post_json(&app.router, "/register/options", body.clone()).await;
    let (_, a2) = post_json(&app.router, "/register/options", body).await;
    assert_eq!(a1["legend"], a2["legend"]);
}

// ─── /register/verify ───────────────────────────────────────

#[tokio::test]
async fn register_verify_created_then_idempotent() {
    let app = app().await;
    let pot_id = create_pot(&app).await;
    let payload = register_payload(pot_id, app.creator);
    let envelope = SignedEnvelope::seal_value(&payload, &app.creator_kp).unwrap();

    let (status, body) =
        post_json(&app.router, "/register/verify", envelope_body(&envelope)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "registered");

    let (status, body) =
        post_json(&app.router, "/register/verify", envelope_body(&envelope)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already registered");
}

#[tokio::test]
async fn register_verify_foreign_signer_unauthorized() {
    let app = app().await;
    let pot_id = create_pot(&app).await;
    let payload = register_payload(pot_id, app.creator);
    let envelope = SignedEnvelope::seal_value(&payload, &app.hunter_kp).unwrap();
    let (status, _) = post_json(&app.router, "/register/verify", envelope_body(&envelope)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_verify_unknown_pot_not_found() {
    let app = app().await;
    let payload = register_payload(4242, app.creator);
    let envelope = SignedEnvelope::seal_value(&payload, &app.creator_kp).unwrap();
    let (status, _) = post_json(&app.router, "/register/verify", envelope_body(&envelope)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn register_verify_expired_window_gone() {
    let app = app().await;
    let pot_id = create_pot(&app).await;
    let mut payload = register_payload(pot_id, app.creator);
    payload.iat = unix_now().saturating_sub(7200);
    payload.exp = unix_now().saturating_sub(3600);
    let envelope = SignedEnvelope::seal_value(&payload, &app.creator_kp).unwrap();
    let (status, _) = post_json(&app.router, "/register/verify", envelope_body(&envelope)).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn register_verify_malformed_hex_bad_request() {
    let app = app().await;
    let body = json!({"encrypted_payload": "zz-not-hex", "signature": "0x00"});
    let (status, _) = post_json(&app.router, "/register/verify", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── /authenticate/* ────────────────────────────────────────

#[tokio::test]
async fn authenticate_full_flow_succeeds() {
    let app = app().await;
    let pot_id = register_pot(&app).await;
    let attempt_id = app
        .state
        .attempts
        .request_attempt(pot_id, app.hunter)
        .await
        .unwrap();

    let (challenge_id, challenges) = issue_challenges(&app, attempt_id).await;
    assert_eq!(challenges.len(), 3);

    let solutions = solve(&challenges, 'A', &demo_legend());
    let (status, body) = submit_answers(&app, &challenge_id, solutions).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let pot = app.state.ledger.get_pot(pot_id).await.unwrap();
    assert_eq!(pot.status, PotStatus::Resolved);
}

#[tokio::test]
async fn authenticate_wrong_answers_fail_and_report_settled_on_retry() {
    let app = app().await;
    let pot_id = register_pot(&app).await;
    let attempt_id = app
        .state
        .attempts
        .request_attempt(pot_id, app.hunter)
        .await
        .unwrap();
    let (challenge_id, challenges) = issue_challenges(&app, attempt_id).await;

    let mut solutions = solve(&challenges, 'A', &demo_legend());
    let correct = solutions[0].clone();
    solutions[0] = if correct == "S" { "U".into() } else { "S".into() };

    let (status, body) = submit_answers(&app, &challenge_id, solutions.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);

    // Replayed submission observes the original outcome.
    let (status, body) = submit_answers(&app, &challenge_id, solutions).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["note"].as_str().unwrap().contains("already settled"));
}

#[tokio::test]
async fn authenticate_verify_unknown_challenge_not_found() {
    let app = app().await;
    register_pot(&app).await;
    let (status, _) =
        submit_answers(&app, "f6f0beadfeed", vec!["U".into(), "U".into(), "U".into()]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn authenticate_options_repeat_conflicts() {
    let app = app().await;
    let pot_id = register_pot(&app).await;
    let attempt_id = app
        .state
        .attempts
        .request_attempt(pot_id, app.hunter)
        .await
        .unwrap();
    issue_challenges(&app, attempt_id).await;

    let payload = AttemptOptionsPayload {
        attempt_id: attempt_id.to_string(),
        chain_id: CHAIN_ID,
    };
    let envelope =
        SignedEnvelope::seal_with_message(&payload, &payload.attempt_id, &app.hunter_kp).unwrap();
    let (status, _) =
        post_json(&app.router, "/authenticate/options", envelope_body(&envelope)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn authenticate_options_unregistered_pot_not_found() {
    let app = app().await;
    let pot_id = create_pot(&app).await; // never registered
    let attempt_id = app
        .state
        .attempts
        .request_attempt(pot_id, app.hunter)
        .await
        .unwrap();

    let payload = AttemptOptionsPayload {
        attempt_id: attempt_id.to_string(),
        chain_id: CHAIN_ID,
    };
    let envelope =
        SignedEnvelope::seal_with_message(&payload, &payload.attempt_id, &app.hunter_kp).unwrap();
    let (status, _) =
        post_json(&app.router, "/authenticate/options", envelope_body(&envelope)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn authenticate_options_foreign_signer_unauthorized() {
    let app = app().await;
    let pot_id = register_pot(&app).await;
    let attempt_id = app
        .state
        .attempts
        .request_attempt(pot_id, app.hunter)
        .await
        .unwrap();

    let payload = AttemptOptionsPayload {
        attempt_id: attempt_id.to_string(),
        chain_id: CHAIN_ID,
    };
    let envelope =
        SignedEnvelope::seal_with_message(&payload, &payload.attempt_id, &app.creator_kp).unwrap();
    let (status, _) =
        post_json(&app.router, "/authenticate/options", envelope_body(&envelope)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ─── /debug/pot/{id} ────────────────────────────────────────

#[tokio::test]
async fn debug_pot_inspect_and_delete() {
    let app = app().await;
    let pot_id = register_pot(&app).await;
    let path = format!("/debug/pot/{pot_id}");

    let (status, body) = get_json(&app.router, &path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registration"]["password"], "A");

    let (status, body) = delete_json(&app.router, &path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, _) = get_json(&app.router, &path).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn debug_pot_invalid_id_bad_request() {
    let app = app().await;
    let (status, _) = get_json(&app.router, "/debug/pot/not-a-number").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
