// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use actix_web::http::Method;
use actix_web::{test, web, App};
use backoff::ExponentialBackoffBuilder;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{H256, U256};
use ethers::utils::keccak256;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;

use escrow_api::{canonical_message, ApiConfig, ApiContext, AuthConfig};
use escrow_data::{Repository, RepositoryConfig};
use escrow_events::{
    hex_address, DecodedLog, EscrowDeployment, EscrowEvent, LogProvenance,
};
use escrow_indexer::new_status_handle;

// Throwaway development keys.
const REQUESTER_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const AGENT_KEY: &str =
    "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
const STRANGER_KEY: &str =
    "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

struct TestState {
    _dir: TempDir,
    repository: Repository,
    context: ApiContext,
}

impl TestState {
    fn setup() -> TestState {
        let dir = TempDir::new().expect("failed to create temp dir");
        let db_path = dir
            .path()
            .join("api.sqlite3")
            .to_str()
            .expect("temp path is not utf-8")
            .to_owned();

        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_millis(5000)))
            .build();
        let repository = Repository::new(
            RepositoryConfig {
                db_path,
                connection_pool_size: 3,
                backoff,
            },
            &deployment(),
        )
        .expect("repository should have connected");

        let config = ApiConfig {
            listen_address: "127.0.0.1:0".to_owned(),
            auth: AuthConfig {
                signature_window_ms: 120_000,
                nonce_ttl_ms: 300_000,
            },
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 1000,
            trust_proxy: false,
            submissions_cap: 500,
        };
        let context = ApiContext::new(
            &config,
            repository.clone(),
            new_status_handle(),
            None,
        );

        TestState {
            _dir: dir,
            repository,
            context,
        }
    }

    /// S1 for task 7: the proof hash commits to `proof_text`.
    fn seed_happy_path(&self, proof_text: &str) {
        let task_id = U256::from(7);
        let proof_hash = H256::from(keccak256(proof_text.as_bytes()));
        let events = vec![
            EscrowEvent::TaskCreated {
                task_id,
                requester: requester().address(),
                payout_amount: 100_000_000,
                max_winners: 1,
                deadline: 1_999_000_000,
                spec_hash: H256::from([0x11; 32]),
            },
            EscrowEvent::TaskFunded {
                task_id,
                requester: requester().address(),
                escrowed_amount: U256::from(100_000_000u64),
                deposit_fee_paid: U256::from(2_000_000u64),
            },
            EscrowEvent::Claimed {
                task_id,
                submission_id: 1,
                agent: agent().address(),
            },
            EscrowEvent::ProofSubmitted {
                task_id,
                submission_id: 1,
                agent: agent().address(),
                proof_hash,
                submitted_at: None,
            },
        ];
        for (i, event) in events.into_iter().enumerate() {
            let block = 100 + i as u64;
            let decoded = DecodedLog {
                event_name: event.name(),
                task_id: Some(event.task_id()),
                args: serde_json::Map::new(),
                provenance: LogProvenance {
                    block_number: block,
                    block_hash: H256::from_low_u64_be(block),
                    tx_hash: H256::from_low_u64_be(block * 1000),
                    log_index: 0,
                },
                event,
            };
            self.repository.apply_event(&decoded).unwrap();
        }
    }
}

fn deployment() -> EscrowDeployment {
    EscrowDeployment {
        chain_id: 8453,
        contract_address: "0x00000000000000000000000000000000000000e5"
            .parse()
            .unwrap(),
    }
}

fn requester() -> LocalWallet {
    REQUESTER_KEY.parse().unwrap()
}

fn agent() -> LocalWallet {
    AGENT_KEY.parse().unwrap()
}

fn stranger() -> LocalWallet {
    STRANGER_KEY.parse().unwrap()
}

async fn signed_request(
    wallet: &LocalWallet,
    method: Method,
    path: &str,
    nonce: &str,
    body: Option<&Value>,
) -> test::TestRequest {
    let body_bytes = body
        .map(|v| serde_json::to_vec(v).unwrap())
        .unwrap_or_default();
    let timestamp = chrono::Utc::now().timestamp_millis().to_string();
    let message = canonical_message(
        method.as_str(),
        path,
        &timestamp,
        nonce,
        &body_bytes,
    );
    let signature = wallet.sign_message(message).await.unwrap();

    test::TestRequest::with_uri(path)
        .method(method)
        .insert_header(("wallet-address", hex_address(&wallet.address())))
        .insert_header(("signature", format!("0x{}", signature)))
        .insert_header(("timestamp", timestamp))
        .insert_header(("nonce", nonce.to_owned()))
        .insert_header(("content-type", "application/json"))
        .set_payload(body_bytes)
}

macro_rules! app {
    ($test:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($test.context.clone()))
                .configure(escrow_api::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_task_listing_and_lookup() {
    let state = TestState::setup();
    state.seed_happy_path("the work is done");
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/tasks").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 200);
    let tasks: Value = test::read_body_json(resp).await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);
    assert_eq!(tasks[0]["taskId"], "7");
    assert_eq!(tasks[0]["payoutAmount"], "100000000");

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/tasks/7").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 200);
    let task: Value = test::read_body_json(resp).await;
    assert_eq!(task["status"], 2);
    assert_eq!(task["pendingSubmissions"], 1);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/tasks/99").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "not_found");
}

#[actix_web::test]
async fn test_metadata_requires_spec_hash_binding() {
    let state = TestState::setup();
    state.seed_happy_path("the work is done");
    let app = app!(state);

    // Mismatching specHash is rejected with 409 and stores nothing.
    let body = json!({
        "title": "Translate the docs",
        "instructions": "Translate README to French",
        "specHash": format!("0x{}", "22".repeat(32)),
    });
    let req = signed_request(
        &requester(),
        Method::POST,
        "/tasks/7/metadata",
        "nonce-conflict",
        Some(&body),
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status().as_u16(), 409);
    let body_json: Value = test::read_body_json(resp).await;
    assert_eq!(body_json["error"], "spec_hash_mismatch");
    assert!(state.repository.task_metadata("7").unwrap().is_none());

    // The committed specHash is accepted and lands in the task view.
    let body = json!({
        "title": "Translate the docs",
        "instructions": "Translate README to French",
        "specHash": format!("0x{}", "11".repeat(32)),
    });
    let req = signed_request(
        &requester(),
        Method::POST,
        "/tasks/7/metadata",
        "nonce-ok",
        Some(&body),
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/tasks/7").to_request(),
    )
    .await;
    let task: Value = test::read_body_json(resp).await;
    assert_eq!(task["metadata"]["title"], "Translate the docs");
}

#[actix_web::test]
async fn test_metadata_requires_requester_role() {
    let state = TestState::setup();
    state.seed_happy_path("the work is done");
    let app = app!(state);

    let body = json!({
        "title": "t",
        "instructions": "i",
        "specHash": format!("0x{}", "11".repeat(32)),
    });
    let req = signed_request(
        &agent(),
        Method::POST,
        "/tasks/7/metadata",
        "nonce-role",
        Some(&body),
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status().as_u16(), 403);
    let body_json: Value = test::read_body_json(resp).await;
    assert_eq!(body_json["error"], "not_requester");
}

#[actix_web::test]
async fn test_proof_rejected_for_non_agent() {
    let state = TestState::setup();
    let proof_text = "I did the thing";
    state.seed_happy_path(proof_text);
    let app = app!(state);

    let proof_hash =
        format!("0x{}", hex::encode(keccak256(proof_text.as_bytes())));
    let body = json!({
        "proofText": proof_text,
        "proofHash": proof_hash,
    });
    let req = signed_request(
        &stranger(),
        Method::POST,
        "/tasks/7/submissions/1/proof",
        "nonce-stranger",
        Some(&body),
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status().as_u16(), 403);
    let body_json: Value = test::read_body_json(resp).await;
    assert_eq!(body_json["error"], "not_agent");
}

#[actix_web::test]
async fn test_proof_text_binding_and_privacy() {
    let state = TestState::setup();
    let proof_text = "I did the thing";
    state.seed_happy_path(proof_text);
    let app = app!(state);

    // Text that does not hash to proofHash never lands.
    let wrong = json!({
        "proofText": "something else entirely",
        "proofHash":
            format!("0x{}", hex::encode(keccak256(proof_text.as_bytes()))),
    });
    let req = signed_request(
        &agent(),
        Method::POST,
        "/tasks/7/submissions/1/proof",
        "nonce-wrong-text",
        Some(&wrong),
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status().as_u16(), 409);

    let body = json!({
        "proofText": proof_text,
        "proofHash":
            format!("0x{}", hex::encode(keccak256(proof_text.as_bytes()))),
    });
    let req = signed_request(
        &agent(),
        Method::POST,
        "/tasks/7/submissions/1/proof",
        "nonce-proof",
        Some(&body),
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status().as_u16(), 200);

    // Anonymous readers see everything but the text.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/tasks/7/submissions")
            .to_request(),
    )
    .await;
    let submissions: Value = test::read_body_json(resp).await;
    assert_eq!(submissions[0]["proofText"], Value::Null);
    assert!(submissions[0]["proofHash"].is_string());

    // The agent sees their own text.
    let req = signed_request(
        &agent(),
        Method::GET,
        "/tasks/7/submissions",
        "nonce-read-agent",
        None,
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    let submissions: Value = test::read_body_json(resp).await;
    assert_eq!(submissions[0]["proofText"], proof_text);

    // So does the task requester.
    let req = signed_request(
        &requester(),
        Method::GET,
        "/tasks/7/submissions",
        "nonce-read-requester",
        None,
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    let submissions: Value = test::read_body_json(resp).await;
    assert_eq!(submissions[0]["proofText"], proof_text);
}

#[actix_web::test]
async fn test_nonce_replay_is_rejected() {
    let state = TestState::setup();
    state.seed_happy_path("the work is done");
    let app = app!(state);

    let body = json!({
        "title": "Translate the docs",
        "instructions": "Translate README to French",
        "specHash": format!("0x{}", "11".repeat(32)),
    });
    let req = signed_request(
        &requester(),
        Method::POST,
        "/tasks/7/metadata",
        "nonce-replayed",
        Some(&body),
    )
    .await;
    let first = req.to_request();
    let resp = test::call_service(&app, first).await;
    assert_eq!(resp.status().as_u16(), 200);

    // Byte-identical replay inside the TTL.
    let req = signed_request(
        &requester(),
        Method::POST,
        "/tasks/7/metadata",
        "nonce-replayed",
        Some(&body),
    )
    .await;
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status().as_u16(), 401);
    let body_json: Value = test::read_body_json(resp).await;
    assert_eq!(body_json["error"], "nonce_already_used");
}

#[actix_web::test]
async fn test_tampered_signature_is_rejected() {
    let state = TestState::setup();
    state.seed_happy_path("the work is done");
    let app = app!(state);

    let body = json!({
        "title": "t",
        "instructions": "i",
        "specHash": format!("0x{}", "11".repeat(32)),
    });
    // Signed by the agent but claiming the requester's address.
    let req = signed_request(
        &agent(),
        Method::POST,
        "/tasks/7/metadata",
        "nonce-forged",
        Some(&body),
    )
    .await
    .insert_header((
        "wallet-address",
        hex_address(&requester().address()),
    ));
    let resp = test::call_service(&app, req.to_request()).await;
    assert_eq!(resp.status().as_u16(), 401);
    let body_json: Value = test::read_body_json(resp).await;
    assert_eq!(body_json["error"], "signature_mismatch");
}

#[actix_web::test]
async fn test_wallet_task_listing() {
    let state = TestState::setup();
    state.seed_happy_path("the work is done");
    let app = app!(state);

    let path = format!("/wallets/{}/tasks", hex_address(&agent().address()));
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri(&path).to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 200);
    let tasks: Value = test::read_body_json(resp).await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/wallets/not-an-address/tasks")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn test_event_journal_endpoint() {
    let state = TestState::setup();
    state.seed_happy_path("the work is done");
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/tasks/7/events").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 200);
    let events: Value = test::read_body_json(resp).await;
    let names: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["eventName"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["TaskCreated", "TaskFunded", "Claimed", "ProofSubmitted"]
    );
}

#[actix_web::test]
async fn test_indexer_status_endpoint() {
    let state = TestState::setup();
    {
        let mut status = state.context.status.write().await;
        status.head = Some(120);
        status.cursor = Some(105);
    }
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/indexer/status").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 200);
    let status: Value = test::read_body_json(resp).await;
    assert_eq!(status["head"], 120);
    assert_eq!(status["cursor"], 105);
    assert_eq!(status["error"], Value::Null);
}

#[actix_web::test]
async fn test_check_funding_shim() {
    let state = TestState::setup();
    state.seed_happy_path("the work is done");
    let app = app!(state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/tasks/7/check-funding")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["funded"], true);
    assert_eq!(body["balance"], "100000000");
}
