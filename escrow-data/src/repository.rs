// (c) Clawed Labs and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use backoff::ExponentialBackoff;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{
    ConnectionManager, CustomizeConnection, Pool, PooledConnection,
};
use diesel::sqlite::SqliteConnection;
use diesel::{insert_into, prelude::*};
use diesel_migrations::{
    embed_migrations, EmbeddedMigrations, MigrationHarness,
};
use snafu::ResultExt;
use std::collections::HashMap;
use std::sync::Arc;

use escrow_events::EscrowDeployment;

use super::config::RepositoryConfig;
use super::error::{
    DatabaseConnectionSnafu, DatabaseSnafu, Error, MigrationSnafu,
};
use super::schema;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
use super::types::{
    CursorRow, EventRow, NewProofRow, NonceRow, ProofRow, SubmissionRow,
    TaskMetadataRow, TaskRow,
};

/// Sets the pragmas every pooled connection needs; the store is shared by
/// the indexer loops and the HTTP handlers.
#[derive(Debug)]
struct ConnectionTuning;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for ConnectionTuning
{
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA busy_timeout = 5000; \
             PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[derive(Clone, Debug)]
pub struct Repository {
    // Connection is not thread safe to share between threads, we use connection pool
    db_pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    backoff: ExponentialBackoff,
    pub(crate) chain_id: i64,
    pub(crate) contract_address: String,
}

impl Repository {
    /// Open the store for one deployment: build the connection pool (with a
    /// backoff strategy, waiting out transient failures) and bring the
    /// schema up to date. The embedded database has no separate
    /// provisioning step, so opening and migrating are one operation.
    pub fn new(
        config: RepositoryConfig,
        deployment: &EscrowDeployment,
    ) -> Result<Self, Error> {
        let pool_size = config.connection_pool_size;
        let db_path = config.db_path.clone();
        let db_pool = backoff::retry(config.backoff.clone(), || {
            tracing::info!(?db_path, "trying to create db pool for escrow store");
            Pool::builder()
                .max_size(pool_size)
                .connection_customizer(Box::new(ConnectionTuning))
                .build(ConnectionManager::<SqliteConnection>::new(&db_path))
                .map_err(backoff::Error::transient)
        })
        .context(DatabaseConnectionSnafu)?;
        let repository = Self {
            db_pool: Arc::new(db_pool),
            backoff: config.backoff,
            chain_id: deployment.chain_id as i64,
            contract_address: deployment.contract_address_hex(),
        };
        repository.migrate()?;
        Ok(repository)
    }

    fn migrate(&self) -> Result<(), Error> {
        let mut conn = self.conn()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .context(MigrationSnafu)?;
        for migration in applied.iter() {
            tracing::debug!(%migration, "applied store migration");
        }
        Ok(())
    }

    /// Obtain a connection from the connection pool
    pub(crate) fn conn(
        &self,
    ) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>, Error>
    {
        backoff::retry(self.backoff.clone(), || {
            self.db_pool.get().map_err(backoff::Error::transient)
        })
        .context(DatabaseConnectionSnafu)
    }
}

/// Indexer cursor
impl Repository {
    pub fn cursor(&self) -> Result<Option<i64>, Error> {
        use schema::escrow_indexer_cursor::dsl;
        let mut conn = self.conn()?;
        dsl::escrow_indexer_cursor
            .find((self.chain_id, self.contract_address.clone()))
            .first::<CursorRow>(&mut conn)
            .optional()
            .context(DatabaseSnafu)
            .map(|row| row.map(|r| r.last_processed_block))
    }

    /// Unconditional write; the engine is responsible for only moving the
    /// cursor backwards on bootstrap and `force_from_block`.
    pub fn set_cursor(&self, block: i64) -> Result<(), Error> {
        use schema::escrow_indexer_cursor::dsl;
        let mut conn = self.conn()?;
        let row = CursorRow {
            chain_id: self.chain_id,
            contract_address: self.contract_address.clone(),
            last_processed_block: block,
            updated_at: chrono::Utc::now().naive_utc(),
        };
        insert_into(dsl::escrow_indexer_cursor)
            .values(&row)
            .on_conflict((dsl::chain_id, dsl::contract_address))
            .do_update()
            .set((
                dsl::last_processed_block.eq(row.last_processed_block),
                dsl::updated_at.eq(row.updated_at),
            ))
            .execute(&mut conn)
            .context(DatabaseSnafu)?;
        tracing::trace!(block, "cursor was written to the store");
        Ok(())
    }
}

/// Projection reads backing the public API
impl Repository {
    pub fn task(&self, task_id: &str) -> Result<Option<TaskRow>, Error> {
        use schema::escrow_tasks::dsl;
        let mut conn = self.conn()?;
        dsl::escrow_tasks
            .find((self.chain_id, self.contract_address.clone(), task_id))
            .first::<TaskRow>(&mut conn)
            .optional()
            .context(DatabaseSnafu)
    }

    pub fn task_metadata(
        &self,
        task_id: &str,
    ) -> Result<Option<TaskMetadataRow>, Error> {
        use schema::escrow_task_metadata::dsl;
        let mut conn = self.conn()?;
        dsl::escrow_task_metadata
            .find((self.chain_id, self.contract_address.clone(), task_id))
            .first::<TaskMetadataRow>(&mut conn)
            .optional()
            .context(DatabaseSnafu)
    }

    /// Latest tasks joined with their off-chain metadata, most recently
    /// updated first.
    pub fn latest_tasks(
        &self,
        limit: i64,
    ) -> Result<Vec<(TaskRow, Option<TaskMetadataRow>)>, Error> {
        use schema::escrow_tasks::dsl;
        let mut conn = self.conn()?;
        let tasks = dsl::escrow_tasks
            .filter(dsl::chain_id.eq(self.chain_id))
            .filter(dsl::contract_address.eq(&self.contract_address))
            .order(dsl::updated_block.desc())
            .limit(limit)
            .load::<TaskRow>(&mut conn)
            .context(DatabaseSnafu)?;
        self.join_metadata(&mut conn, tasks)
    }

    /// Tasks where the wallet is the requester or the agent of any
    /// submission.
    pub fn tasks_for_wallet(
        &self,
        wallet: &str,
        limit: i64,
    ) -> Result<Vec<(TaskRow, Option<TaskMetadataRow>)>, Error> {
        use schema::escrow_submissions::dsl as submissions;
        use schema::escrow_tasks::dsl as tasks;
        let mut conn = self.conn()?;
        let agent_task_ids = submissions::escrow_submissions
            .filter(submissions::chain_id.eq(self.chain_id))
            .filter(submissions::contract_address.eq(&self.contract_address))
            .filter(submissions::agent.eq(wallet))
            .select(submissions::task_id);
        let rows = tasks::escrow_tasks
            .filter(tasks::chain_id.eq(self.chain_id))
            .filter(tasks::contract_address.eq(&self.contract_address))
            .filter(
                tasks::requester
                    .eq(wallet)
                    .or(tasks::task_id.eq_any(agent_task_ids)),
            )
            .order(tasks::updated_block.desc())
            .limit(limit)
            .load::<TaskRow>(&mut conn)
            .context(DatabaseSnafu)?;
        self.join_metadata(&mut conn, rows)
    }

    fn join_metadata(
        &self,
        conn: &mut SqliteConnection,
        tasks: Vec<TaskRow>,
    ) -> Result<Vec<(TaskRow, Option<TaskMetadataRow>)>, Error> {
        use schema::escrow_task_metadata::dsl;
        let ids: Vec<&str> =
            tasks.iter().map(|t| t.task_id.as_str()).collect();
        let mut by_task: HashMap<String, TaskMetadataRow> =
            dsl::escrow_task_metadata
                .filter(dsl::chain_id.eq(self.chain_id))
                .filter(dsl::contract_address.eq(&self.contract_address))
                .filter(dsl::task_id.eq_any(ids))
                .load::<TaskMetadataRow>(conn)
                .context(DatabaseSnafu)?
                .into_iter()
                .map(|m| (m.task_id.clone(), m))
                .collect();
        Ok(tasks
            .into_iter()
            .map(|t| {
                let metadata = by_task.remove(&t.task_id);
                (t, metadata)
            })
            .collect())
    }

    /// Submissions of one task ordered by numeric submission id. Claims are
    /// unbounded on-chain, hence the row cap.
    pub fn submissions(
        &self,
        task_id: &str,
        cap: i64,
    ) -> Result<Vec<SubmissionRow>, Error> {
        use schema::escrow_submissions::dsl;
        let mut conn = self.conn()?;
        dsl::escrow_submissions
            .filter(dsl::chain_id.eq(self.chain_id))
            .filter(dsl::contract_address.eq(&self.contract_address))
            .filter(dsl::task_id.eq(task_id))
            .order(dsl::submission_id.asc())
            .limit(cap)
            .load::<SubmissionRow>(&mut conn)
            .context(DatabaseSnafu)
    }

    pub fn submission(
        &self,
        task_id: &str,
        submission_id: i64,
    ) -> Result<Option<SubmissionRow>, Error> {
        use schema::escrow_submissions::dsl;
        let mut conn = self.conn()?;
        dsl::escrow_submissions
            .find((
                self.chain_id,
                self.contract_address.clone(),
                task_id,
                submission_id,
            ))
            .first::<SubmissionRow>(&mut conn)
            .optional()
            .context(DatabaseSnafu)
    }

    /// Raw event journal of one task in chain order.
    pub fn events_for_task(
        &self,
        task_id: &str,
    ) -> Result<Vec<EventRow>, Error> {
        use schema::escrow_events::dsl;
        let mut conn = self.conn()?;
        dsl::escrow_events
            .filter(dsl::chain_id.eq(self.chain_id))
            .filter(dsl::contract_address.eq(&self.contract_address))
            .filter(dsl::task_id.eq(task_id))
            .order((dsl::block_number.asc(), dsl::log_index.asc()))
            .load::<EventRow>(&mut conn)
            .context(DatabaseSnafu)
    }

    pub fn event_count(&self) -> Result<i64, Error> {
        use schema::escrow_events::dsl;
        let mut conn = self.conn()?;
        dsl::escrow_events
            .filter(dsl::chain_id.eq(self.chain_id))
            .filter(dsl::contract_address.eq(&self.contract_address))
            .count()
            .get_result(&mut conn)
            .context(DatabaseSnafu)
    }
}

/// Off-chain writes owned by the metadata service
impl Repository {
    pub fn upsert_task_metadata(
        &self,
        mut row: TaskMetadataRow,
    ) -> Result<(), Error> {
        use schema::escrow_task_metadata::dsl;
        row.chain_id = self.chain_id;
        row.contract_address = self.contract_address.clone();
        let mut conn = self.conn()?;
        insert_into(dsl::escrow_task_metadata)
            .values(&row)
            .on_conflict((
                dsl::chain_id,
                dsl::contract_address,
                dsl::task_id,
            ))
            .do_update()
            .set(&row)
            .execute(&mut conn)
            .context(DatabaseSnafu)?;
        tracing::trace!(task_id = %row.task_id, "task metadata was written");
        Ok(())
    }

    /// Append-only; older proof texts are retained as history.
    pub fn insert_proof(&self, mut row: NewProofRow) -> Result<(), Error> {
        use schema::escrow_submission_proofs::dsl;
        row.chain_id = self.chain_id;
        row.contract_address = self.contract_address.clone();
        let mut conn = self.conn()?;
        insert_into(dsl::escrow_submission_proofs)
            .values(&row)
            .execute(&mut conn)
            .context(DatabaseSnafu)?;
        tracing::trace!(
            task_id = %row.task_id,
            submission_id = row.submission_id,
            "proof text was appended"
        );
        Ok(())
    }

    /// Newest first within each submission; callers keep the head entry.
    pub fn proofs_for_task(
        &self,
        task_id: &str,
    ) -> Result<Vec<ProofRow>, Error> {
        use schema::escrow_submission_proofs::dsl;
        let mut conn = self.conn()?;
        dsl::escrow_submission_proofs
            .filter(dsl::chain_id.eq(self.chain_id))
            .filter(dsl::contract_address.eq(&self.contract_address))
            .filter(dsl::task_id.eq(task_id))
            .order((dsl::submission_id.asc(), dsl::id.desc()))
            .load::<ProofRow>(&mut conn)
            .context(DatabaseSnafu)
    }
}

/// Signature anti-replay
impl Repository {
    /// Registers a nonce, returning false when it was already used inside
    /// its TTL window. Expired rows are swept on the way in.
    pub fn try_use_nonce(
        &self,
        nonce: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<bool, Error> {
        use schema::escrow_used_nonces::dsl;
        let mut conn = self.conn()?;
        conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(
                dsl::escrow_used_nonces.filter(dsl::expires_at.lt(now_ms)),
            )
            .execute(conn)?;
            let inserted = insert_into(dsl::escrow_used_nonces)
                .values(&NonceRow {
                    nonce: nonce.to_owned(),
                    expires_at: now_ms + ttl_ms,
                })
                .on_conflict_do_nothing()
                .execute(conn)?;
            Ok(inserted == 1)
        })
        .context(DatabaseSnafu)
    }
}
