//! `Store` over Postgres via `sqlx` (spec §6 "Store capability";
//! persisted state layout).
//!
//! Struct shape (constructor, `#[instrument]`'d async methods
//! returning a crate-level error) is grounded on the teacher's
//! `crates/api/src/blockanalitica.rs` client; the transport itself —
//! `sqlx::PgPool`, `PgPoolOptions`, embedded `sqlx::migrate!` — is
//! grounded on `other_examples` sqlx users (`Hartman25-MiniQuantDeskV4`'s
//! `mqk-db` crate), since no pack teacher talks to a database directly.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::FromRow;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use settler_core::{Intent, IntentStatus, SettlementError, Store};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects and verifies the pool answers before handing back a
    /// usable `Store`. Does not run migrations — call [`Self::migrate`]
    /// explicitly at the composition root, the same separation
    /// `mqk-db::connect_from_env`/`migrate` keep.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("failed to connect to postgres")?;
        Ok(Self { pool })
    }

    /// Runs the embedded migrations creating `intents`/`dlq_entries`
    /// (spec §6 persisted state layout).
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run settler-store migrations")?;
        Ok(())
    }
}

/// Flat row shape matching the `intents` table; every `alloy` type is
/// stored and read back as text and converted through `TryFrom` below,
/// since none of `Address`/`U256`/`Bytes` implement `sqlx::Decode`.
#[derive(FromRow)]
struct IntentRow {
    id: String,
    status: String,
    hash: Option<String>,
    to: String,
    value: String,
    calldata: String,
    gas_limit: String,
    retry_count: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IntentRow> for Intent {
    type Error = SettlementError;

    fn try_from(row: IntentRow) -> Result<Self, Self::Error> {
        Ok(Intent {
            id: row.id,
            status: parse_status(&row.status)?,
            hash: row.hash,
            to: row.to.parse().map_err(|_| malformed_row("to", &row.to))?,
            value: row.value.parse().map_err(|_| malformed_row("value", &row.value))?,
            calldata: row
                .calldata
                .parse()
                .map_err(|_| malformed_row("calldata", &row.calldata))?,
            gas_limit: row
                .gas_limit
                .parse()
                .map_err(|_| malformed_row("gas_limit", &row.gas_limit))?,
            retry_count: row.retry_count.max(0) as u32,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_status(raw: &str) -> Result<IntentStatus, SettlementError> {
    match raw {
        "PENDING" => Ok(IntentStatus::Pending),
        "PROCESSING" => Ok(IntentStatus::Processing),
        "SETTLED" => Ok(IntentStatus::Settled),
        "FAILED" => Ok(IntentStatus::Failed),
        other => Err(SettlementError::StoreError {
            message: format!("unrecognized intent status '{other}' in row"),
            operation: "decode_row".to_string(),
        }),
    }
}

fn malformed_row(field: &str, value: &str) -> SettlementError {
    SettlementError::StoreError {
        message: format!("column '{field}' holds an unparseable value '{value}'"),
        operation: "decode_row".to_string(),
    }
}

fn store_err(operation: &str, err: sqlx::Error) -> SettlementError {
    SettlementError::StoreError {
        message: err.to_string(),
        operation: operation.to_string(),
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self))]
    async fn get_pending(&self) -> Result<Vec<Intent>, SettlementError> {
        let rows: Vec<IntentRow> = sqlx::query_as(
            "select id, status, hash, \"to\", value, calldata, gas_limit, retry_count, last_error, created_at, updated_at \
             from intents where status = 'PENDING' order by created_at asc",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("get_pending", e))?;
        debug!(count = rows.len(), "polled pending intents");
        rows.into_iter().map(Intent::try_from).collect()
    }

    async fn get_by_status(&self, status: IntentStatus) -> Result<Vec<Intent>, SettlementError> {
        let rows: Vec<IntentRow> = sqlx::query_as(
            "select id, status, hash, \"to\", value, calldata, gas_limit, retry_count, last_error, created_at, updated_at \
             from intents where status = $1 order by created_at asc",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("get_by_status", e))?;
        rows.into_iter().map(Intent::try_from).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<Intent>, SettlementError> {
        let row: Option<IntentRow> = sqlx::query_as(
            "select id, status, hash, \"to\", value, calldata, gas_limit, retry_count, last_error, created_at, updated_at \
             from intents where id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("get", e))?;
        row.map(Intent::try_from).transpose()
    }

    async fn get_by_hash(&self, hash: &str) -> Result<Option<Intent>, SettlementError> {
        let row: Option<IntentRow> = sqlx::query_as(
            "select id, status, hash, \"to\", value, calldata, gas_limit, retry_count, last_error, created_at, updated_at \
             from intents where hash = $1",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("get_by_hash", e))?;
        row.map(Intent::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn set_status(
        &self,
        id: &str,
        status: IntentStatus,
        hash: Option<&str>,
    ) -> Result<(), SettlementError> {
        sqlx::query(
            "update intents set status = $1, hash = coalesce($2, hash), updated_at = now() where id = $3",
        )
        .bind(status.as_str())
        .bind(hash)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("set_status", e))?;
        Ok(())
    }

    async fn increment_retry(&self, id: &str) -> Result<(), SettlementError> {
        sqlx::query("update intents set retry_count = retry_count + 1, updated_at = now() where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("increment_retry", e))?;
        Ok(())
    }

    async fn record_error(&self, id: &str, text: &str) -> Result<(), SettlementError> {
        sqlx::query("update intents set last_error = $1, updated_at = now() where id = $2")
            .bind(text)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("record_error", e))?;
        Ok(())
    }

    /// Atomically inserts the DLQ row and flips the intent to FAILED in
    /// one transaction (invariant 2: a DLQ row exists iff FAILED).
    #[instrument(skip(self))]
    async fn dlq(
        &self,
        intent_id: &str,
        reason: &str,
        details: Option<&str>,
    ) -> Result<(), SettlementError> {
        let mut tx = self.pool.begin().await.map_err(|e| store_err("dlq", e))?;

        sqlx::query(
            "insert into dlq_entries (id, intent_id, reason, error_details) values ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(intent_id)
        .bind(reason)
        .bind(details)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_err("dlq", e))?;

        sqlx::query("update intents set status = 'FAILED', updated_at = now() where id = $1")
            .bind(intent_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_err("dlq", e))?;

        tx.commit().await.map_err(|e| store_err("dlq", e))?;
        Ok(())
    }
}
