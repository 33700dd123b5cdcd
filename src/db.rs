// src/db.rs
//! PostgreSQL poll store.
//!
//! A vote is one transaction: the voter row is inserted with
//! `ON CONFLICT DO NOTHING` against the `(poll_id, address)` key and the
//! option counter is bumped in the same transaction. Zero inserted rows means
//! the address already voted and the transaction is rolled back.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::error::PollError;
use crate::models::{Poll, PollOption};
use crate::poll::{generate_poll_id, NewPoll, PollStore};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS polls (
        id TEXT PRIMARY KEY,
        question TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS poll_options (
        poll_id TEXT NOT NULL REFERENCES polls (id),
        position INTEGER NOT NULL,
        text TEXT NOT NULL,
        votes BIGINT NOT NULL DEFAULT 0 CHECK (votes >= 0),
        PRIMARY KEY (poll_id, position)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS poll_voters (
        poll_id TEXT NOT NULL REFERENCES polls (id),
        address TEXT NOT NULL,
        voted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (poll_id, address)
    )
    "#,
];

/// Advisory lock key held while the schema is created, so instances starting
/// together do not race on `CREATE TABLE IF NOT EXISTS`.
const SCHEMA_LOCK: i64 = 0x6c69_7665_706f_6c6c;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[derive(sqlx::FromRow)]
struct PollRow {
    id: String,
    question: String,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgPollStore {
    pool: PgPool,
}

impl PgPollStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, PollError> {
        let pool = create_pool(database_url, max_connections).await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Creates the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), PollError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK)
            .execute(&mut *tx)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("Poll schema ready");
        Ok(())
    }
}

async fn load(conn: &mut PgConnection, id: &str) -> Result<Poll, PollError> {
    let row = sqlx::query_as::<_, PollRow>("SELECT id, question, created_at FROM polls WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(PollError::NotFound)?;

    let options = sqlx::query_as::<_, PollOption>(
        "SELECT text, votes FROM poll_options WHERE poll_id = $1 ORDER BY position",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let voters: Vec<String> =
        sqlx::query_scalar("SELECT address FROM poll_voters WHERE poll_id = $1")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(Poll {
        id: row.id,
        question: row.question,
        options,
        voter_addresses: voters.into_iter().collect::<HashSet<_>>(),
        created_at: row.created_at,
    })
}

impl PollStore for PgPollStore {
    async fn create(&self, new_poll: NewPoll) -> Result<Poll, PollError> {
        let mut tx = self.pool.begin().await?;

        // Regenerate on id collision.
        let id = loop {
            let id = generate_poll_id();
            let inserted = sqlx::query(
                "INSERT INTO polls (id, question) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING",
            )
            .bind(&id)
            .bind(&new_poll.question)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 1 {
                break id;
            }
        };

        for (position, text) in new_poll.options.iter().enumerate() {
            sqlx::query("INSERT INTO poll_options (poll_id, position, text) VALUES ($1, $2, $3)")
                .bind(&id)
                .bind(position as i32)
                .bind(text)
                .execute(&mut *tx)
                .await?;
        }

        let poll = load(&mut *tx, &id).await?;
        tx.commit().await?;

        debug!("Stored poll {id}");
        Ok(poll)
    }

    async fn get(&self, id: &str) -> Result<Poll, PollError> {
        let mut conn = self.pool.acquire().await?;
        load(&mut *conn, id).await
    }

    async fn record_vote(
        &self,
        id: &str,
        option_index: usize,
        voter: &str,
    ) -> Result<Poll, PollError> {
        let mut tx = self.pool.begin().await?;

        let option_count: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM poll_options WHERE poll_id = p.id) FROM polls p WHERE p.id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PollError::NotFound)?;

        let position = i32::try_from(option_index).map_err(|_| PollError::InvalidOption)?;
        if i64::from(position) >= option_count {
            return Err(PollError::InvalidOption);
        }

        let inserted = sqlx::query(
            "INSERT INTO poll_voters (poll_id, address) VALUES ($1, $2) ON CONFLICT (poll_id, address) DO NOTHING",
        )
        .bind(id)
        .bind(voter)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            return Err(PollError::AlreadyVoted);
        }

        sqlx::query("UPDATE poll_options SET votes = votes + 1 WHERE poll_id = $1 AND position = $2")
            .bind(id)
            .bind(position)
            .execute(&mut *tx)
            .await?;

        let poll = load(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(poll)
    }
}
