// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, Log, H256, U256, U64};
use std::time::Duration;
use tempfile::TempDir;

use escrow_data::{Repository, RepositoryConfig, SubmissionStatus, TaskStatus};
use escrow_events::{event_signatures, EscrowDeployment};
use escrow_indexer::{
    new_status_handle, ChainSource, ChainSourceError, Engine, EngineOptions,
    Step,
};

struct TestState {
    _dir: TempDir,
    repository: Repository,
}

impl TestState {
    fn setup() -> TestState {
        let dir = TempDir::new().expect("failed to create temp dir");
        let db_path = dir
            .path()
            .join("indexer.sqlite3")
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

        TestState {
            _dir: dir,
            repository,
        }
    }

    fn engine(&self, chain: MockChain, options: EngineOptions) -> Engine<MockChain> {
        Engine::new(
            chain,
            self.repository.clone(),
            deployment(),
            options,
            new_status_handle(),
        )
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

fn options() -> EngineOptions {
    EngineOptions {
        confirmations: 15,
        batch_blocks: 1500,
        far_behind_threshold: 1_000_000,
        bootstrap_tail_blocks: 5000,
        force_from_block: None,
    }
}

struct MockChain {
    head: u64,
    logs: Vec<Log>,
}

#[async_trait]
impl ChainSource for MockChain {
    async fn block_number(&self) -> Result<u64, ChainSourceError> {
        Ok(self.head)
    }

    async fn logs(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, ChainSourceError> {
        Ok(self
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap().as_u64();
                block >= from && block <= to
            })
            .cloned()
            .collect())
    }
}

fn requester() -> Address {
    "0x00000000000000000000000000000000000000aa".parse().unwrap()
}

fn agent() -> Address {
    "0x00000000000000000000000000000000000000bb".parse().unwrap()
}

fn signature_of(name: &str) -> H256 {
    // Declaration order in the registry.
    let index = escrow_events::EVENT_NAMES
        .iter()
        .position(|n| *n == name)
        .unwrap();
    event_signatures()[index]
}

fn uint_topic(value: u64) -> H256 {
    let mut bytes = [0u8; 32];
    U256::from(value).to_big_endian(&mut bytes);
    H256::from(bytes)
}

fn make_log(block: u64, log_index: u64, topics: Vec<H256>, data: Vec<u8>) -> Log {
    Log {
        address: deployment().contract_address,
        topics,
        data: Bytes::from(data),
        block_hash: Some(H256::from_low_u64_be(block)),
        block_number: Some(U64::from(block)),
        transaction_hash: Some(H256::from_low_u64_be(block * 1000 + log_index)),
        log_index: Some(U256::from(log_index)),
        ..Default::default()
    }
}

/// The S1 sequence for task 7, one event per block from 100 to 105.
fn happy_path_logs() -> Vec<Log> {
    vec![
        make_log(
            100,
            0,
            vec![
                signature_of("TaskCreated"),
                uint_topic(7),
                H256::from(requester()),
            ],
            encode(&[
                Token::Uint(U256::from(100_000_000u64)),
                Token::Uint(U256::from(1u64)),
                Token::Uint(U256::from(1_999_000_000u64)),
                Token::FixedBytes(vec![0x11; 32]),
            ]),
        ),
        make_log(
            101,
            0,
            vec![
                signature_of("TaskFunded"),
                uint_topic(7),
                H256::from(requester()),
            ],
            encode(&[
                Token::Uint(U256::from(100_000_000u64)),
                Token::Uint(U256::from(2_000_000u64)),
            ]),
        ),
        make_log(
            102,
            0,
            vec![
                signature_of("Claimed"),
                uint_topic(7),
                uint_topic(1),
                H256::from(agent()),
            ],
            vec![],
        ),
        make_log(
            103,
            0,
            vec![
                signature_of("ProofSubmitted"),
                uint_topic(7),
                uint_topic(1),
                H256::from(agent()),
            ],
            encode(&[Token::FixedBytes(vec![0x22; 32])]),
        ),
        make_log(
            104,
            0,
            vec![
                signature_of("Approved"),
                uint_topic(7),
                uint_topic(1),
                H256::from(requester()),
            ],
            vec![],
        ),
        make_log(
            105,
            0,
            vec![
                signature_of("Withdrawn"),
                uint_topic(7),
                uint_topic(1),
                H256::from(agent()),
            ],
            encode(&[
                Token::Uint(U256::from(98_000_000u64)),
                Token::Uint(U256::from(2_000_000u64)),
            ]),
        ),
    ]
}

#[tokio::test]
async fn test_bootstrap_near_head() {
    let test = TestState::setup();
    let mut engine = test.engine(
        MockChain {
            head: 30_000_000,
            logs: vec![],
        },
        options(),
    );

    let step = engine.advance_once().await.unwrap();
    match step {
        Step::Progress { from, to, .. } => {
            // target = 29_999_985, bootstrap cursor = target - 5000
            assert_eq!(from, 29_994_986);
            assert_eq!(to, 29_996_485);
        }
        other => panic!("expected progress, got {:?}", other),
    }
    let cursor = test.repository.cursor().unwrap().unwrap();
    assert!(cursor >= 29_994_985);
}

#[tokio::test]
async fn test_backfill_projects_happy_path() {
    let test = TestState::setup();
    let mut engine = test.engine(
        MockChain {
            head: 120,
            logs: happy_path_logs(),
        },
        options(),
    );

    let step = engine.advance_once().await.unwrap();
    match step {
        Step::Progress { processed, undecodable, to, .. } => {
            assert_eq!(processed, 6);
            assert_eq!(undecodable, 0);
            assert_eq!(to, 105); // head - confirmations
        }
        other => panic!("expected progress, got {:?}", other),
    }

    let task = test.repository.task("7").unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed as i32);
    assert_eq!(task.approved_count, 1);
    assert_eq!(task.withdrawn_count, 1);
    assert_eq!(task.pending_submissions, 0);
    let submission = test.repository.submission("7", 1).unwrap().unwrap();
    assert_eq!(submission.status, SubmissionStatus::Withdrawn as i32);

    // Caught up now.
    let step = engine.advance_once().await.unwrap();
    assert!(matches!(step, Step::Idle { .. }));
}

#[tokio::test]
async fn test_forced_rescan_changes_nothing() {
    let test = TestState::setup();
    let chain = || MockChain {
        head: 120,
        logs: happy_path_logs(),
    };
    let mut engine = test.engine(chain(), options());
    engine.advance_once().await.unwrap();
    let before = test.repository.task("7").unwrap().unwrap();

    let mut rescan_options = options();
    rescan_options.force_from_block = Some(1);
    let mut engine = test.engine(chain(), rescan_options);
    let step = engine.advance_once().await.unwrap();
    match step {
        Step::Progress { from, processed, .. } => {
            assert_eq!(from, 1);
            // Every log hits the journal primary key and dedups.
            assert_eq!(processed, 6);
        }
        other => panic!("expected progress, got {:?}", other),
    }

    assert_eq!(test.repository.event_count().unwrap(), 6);
    let after = test.repository.task("7").unwrap().unwrap();
    assert_eq!(before, after);

    // The rewind is one-shot: the next tick stays put.
    let step = engine.advance_once().await.unwrap();
    assert!(matches!(step, Step::Idle { .. }));
}

#[tokio::test]
async fn test_undecodable_logs_are_skipped() {
    let test = TestState::setup();
    let mut logs = happy_path_logs();
    logs.push(make_log(
        102,
        7,
        vec![H256::from_low_u64_be(0xdead)],
        vec![],
    ));
    let mut engine = test.engine(MockChain { head: 120, logs }, options());

    let step = engine.advance_once().await.unwrap();
    match step {
        Step::Progress { processed, undecodable, to, .. } => {
            assert_eq!(processed, 6);
            assert_eq!(undecodable, 1);
            assert_eq!(to, 105);
        }
        other => panic!("expected progress, got {:?}", other),
    }
    // The batch still completed.
    assert_eq!(test.repository.cursor().unwrap(), Some(105));
}

#[tokio::test]
async fn test_batch_is_bounded() {
    let test = TestState::setup();
    test.repository.set_cursor(1000).unwrap();
    let mut engine = test.engine(
        MockChain {
            head: 10_000,
            logs: vec![],
        },
        options(),
    );

    let step = engine.advance_once().await.unwrap();
    match step {
        Step::Progress { from, to, .. } => {
            assert_eq!(from, 1001);
            assert_eq!(to, 2500);
        }
        other => panic!("expected progress, got {:?}", other),
    }
}
