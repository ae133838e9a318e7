//! Credit Ledger
//!
//! The orchestrator only needs two things from billing: the caller's balance
//! and a way to issue a debit. `SqliteCreditLedger` is the local ledger used
//! when no external billing engine is wired in; every debit also lands in the
//! `credit_debits` audit table.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use tracing::info;

use crate::storage::database::DbPool;
use crate::utils::error::{AppError, AppResult};

/// Credit balance and debit contract
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Current balance (0 for unknown users)
    async fn get_balance(&self, user_id: &str) -> AppResult<i64>;

    /// Debit `amount` credits; fails with `INSUFFICIENT_CREDITS` when the
    /// balance does not cover it
    async fn debit(&self, user_id: &str, amount: i64, metadata: Value) -> AppResult<i64>;
}

/// Local ledger backed by `credit_accounts`
#[derive(Clone)]
pub struct SqliteCreditLedger {
    pool: DbPool,
}

impl SqliteCreditLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn connection(&self) -> AppResult<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Set a user's balance outright
    pub fn set_balance(&self, user_id: &str, balance: i64) -> AppResult<()> {
        if balance < 0 {
            return Err(AppError::validation("balance cannot be negative"));
        }
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO credit_accounts (user_id, balance, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET balance = excluded.balance, updated_at = excluded.updated_at",
            params![user_id, balance, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Add credits to a user's balance; returns the new balance
    pub fn grant(&self, user_id: &str, amount: i64) -> AppResult<i64> {
        if amount <= 0 {
            return Err(AppError::validation("grant amount must be positive"));
        }
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO credit_accounts (user_id, balance, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET balance = balance + excluded.balance, updated_at = excluded.updated_at",
            params![user_id, amount, chrono::Utc::now().timestamp_millis()],
        )?;
        let balance: i64 = conn.query_row(
            "SELECT balance FROM credit_accounts WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(balance)
    }

    /// Number of debits issued for a session
    pub fn debit_count(&self, session_id: &str) -> AppResult<i64> {
        let conn = self.connection()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM credit_debits WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn balance_of(conn: &rusqlite::Connection, user_id: &str) -> AppResult<i64> {
        let balance = conn
            .query_row(
                "SELECT balance FROM credit_accounts WHERE user_id = ?1",
                params![user_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(balance.unwrap_or(0))
    }
}

#[async_trait]
impl CreditLedger for SqliteCreditLedger {
    async fn get_balance(&self, user_id: &str) -> AppResult<i64> {
        let conn = self.connection()?;
        Self::balance_of(&conn, user_id)
    }

    async fn debit(&self, user_id: &str, amount: i64, metadata: Value) -> AppResult<i64> {
        if amount < 0 {
            return Err(AppError::validation("debit amount cannot be negative"));
        }

        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let balance = Self::balance_of(&tx, user_id)?;
        if balance < amount {
            return Err(AppError::InsufficientCredits {
                required: amount,
                balance,
            });
        }

        let now = chrono::Utc::now().timestamp_millis();
        let remaining = balance - amount;
        tx.execute(
            "INSERT INTO credit_accounts (user_id, balance, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET balance = excluded.balance, updated_at = excluded.updated_at",
            params![user_id, remaining, now],
        )?;

        let session_id = metadata.get("sessionId").and_then(Value::as_str).map(str::to_string);
        let operation = metadata
            .get("operation")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        tx.execute(
            "INSERT INTO credit_debits (id, user_id, session_id, operation, amount, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid::Uuid::new_v4().to_string(),
                user_id,
                session_id,
                operation,
                amount,
                serde_json::to_string(&metadata)?,
                now,
            ],
        )?;
        tx.commit()?;

        info!(user_id = %user_id, amount, remaining, operation = %operation, "credits debited");
        Ok(remaining)
    }
}

impl std::fmt::Debug for SqliteCreditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCreditLedger").finish()
    }
}
