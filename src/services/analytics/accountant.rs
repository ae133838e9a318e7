//! Usage Accountant
//!
//! Turns each provider call into a costed, append-only `UsageRecord` in the
//! `usage_records` table. Credits come from the operation type, cost from the
//! `CostCalculator`.

use std::sync::Arc;

use rusqlite::params;
use tracing::debug;

use bunyan_llm::{ProviderKind, TokenUsage};

use crate::models::analytics::{format_usd, CostLedger, OperationType, UsageRecord};
use crate::storage::database::DbPool;
use crate::utils::error::{AppError, AppResult};

use super::cost_calculator::CostCalculator;

/// Records provider usage with its cost and credit amount
pub struct UsageAccountant {
    pool: DbPool,
    calculator: Arc<CostCalculator>,
}

impl UsageAccountant {
    pub fn new(pool: DbPool, calculator: Arc<CostCalculator>) -> Self {
        Self { pool, calculator }
    }

    pub fn calculator(&self) -> &Arc<CostCalculator> {
        &self.calculator
    }

    fn connection(&self) -> AppResult<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Cost one provider call and append it to the audit trail
    pub fn record(
        &self,
        session_id: &str,
        provider: ProviderKind,
        operation: OperationType,
        usage: TokenUsage,
    ) -> AppResult<UsageRecord> {
        let cost_picos =
            self.calculator
                .calculate_cost(provider, usage.input_tokens, usage.output_tokens)?;

        let record = UsageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            provider,
            operation,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_picos,
            cost_usd: format_usd(cost_picos),
            credits: operation.credit_cost(),
            rate_version: self.calculator.rate_version(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO usage_records
             (id, session_id, provider, operation, input_tokens, output_tokens,
              cost_picos, credits, rate_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.session_id,
                record.provider.as_str(),
                record.operation.as_str(),
                record.input_tokens as i64,
                record.output_tokens as i64,
                record.cost_picos as i64,
                record.credits,
                record.rate_version,
                record.created_at,
            ],
        )?;

        debug!(
            session_id = %session_id,
            provider = %provider,
            operation = operation.as_str(),
            tokens = record.total_tokens(),
            cost_usd = %record.cost_usd,
            "usage recorded"
        );
        Ok(record)
    }

    /// All records for a session, oldest first
    pub fn list_for_session(&self, session_id: &str) -> AppResult<Vec<UsageRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, provider, operation, input_tokens, output_tokens,
                    cost_picos, credits, rate_version, created_at
             FROM usage_records WHERE session_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, i64>(9)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, session_id, provider, operation, input, output, cost, credits, version, at) =
                row?;
            let provider = ProviderKind::parse(&provider)
                .ok_or_else(|| AppError::database(format!("Unknown provider in usage record: {}", provider)))?;
            let operation = OperationType::parse(&operation)
                .ok_or_else(|| AppError::database(format!("Unknown operation in usage record: {}", operation)))?;
            let cost_picos = cost.max(0) as u64;
            records.push(UsageRecord {
                id,
                session_id,
                provider,
                operation,
                input_tokens: input.max(0) as u64,
                output_tokens: output.max(0) as u64,
                cost_picos,
                cost_usd: format_usd(cost_picos),
                credits,
                rate_version: version,
                created_at: at,
            });
        }
        Ok(records)
    }

    /// Totals for a session, rebuilt from the audit trail
    pub fn session_totals(&self, session_id: &str) -> AppResult<CostLedger> {
        let mut ledger = CostLedger::default();
        for record in self.list_for_session(session_id)? {
            ledger.add(&record);
        }
        Ok(ledger)
    }
}

impl std::fmt::Debug for UsageAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageAccountant").finish()
    }
}
