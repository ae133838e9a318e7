//! Analytics Models
//!
//! Data structures for usage accounting and cost tracking. Money is kept as
//! integer pico-dollars (1 USD = 10^12) so per-token rates expressed in
//! micro-dollars per million tokens multiply out exactly.

use serde::{Deserialize, Serialize};

use bunyan_llm::ProviderKind;

/// Pico-dollars per micro-dollar
pub const PICOS_PER_MICRO: u64 = 1_000_000;

/// Version tag of the built-in rate table
pub const RATE_TABLE_VERSION: &str = "2024-06";

/// Operation a provider call was made for; decides the credit debit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Detection,
    Planning,
    Generation,
    /// Tokens reported by the client when submitting code for validation
    Validation,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Detection => "detection",
            OperationType::Planning => "planning",
            OperationType::Generation => "generation",
            OperationType::Validation => "validation",
        }
    }

    /// Fixed credit cost of the operation
    pub fn credit_cost(&self) -> i64 {
        match self {
            OperationType::Generation => 10,
            _ => 0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "detection" => Some(OperationType::Detection),
            "planning" => Some(OperationType::Planning),
            "generation" => Some(OperationType::Generation),
            "validation" => Some(OperationType::Validation),
            _ => None,
        }
    }
}

/// Per-provider token rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRate {
    pub provider: ProviderKind,
    /// Price per million tokens in micro-dollars (1 USD = 1,000,000)
    pub micros_per_million_tokens: u64,
    /// Rate table version this rate belongs to
    pub version: String,
    /// Whether this is a custom/override rate
    pub is_custom: bool,
}

impl ProviderRate {
    pub fn new(provider: ProviderKind, micros_per_million_tokens: u64) -> Self {
        Self {
            provider,
            micros_per_million_tokens,
            version: RATE_TABLE_VERSION.to_string(),
            is_custom: false,
        }
    }

    /// Exact cost of `tokens` in pico-dollars
    pub fn cost_picos(&self, tokens: u64) -> u64 {
        tokens.saturating_mul(self.micros_per_million_tokens)
    }
}

/// Format pico-dollars as USD with 6 decimal places (half-up rounding)
pub fn format_usd(picos: u64) -> String {
    let micros = picos.saturating_add(PICOS_PER_MICRO / 2) / PICOS_PER_MICRO;
    format!("{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}

/// A single provider call, costed. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Unique record identifier
    pub id: String,
    pub session_id: String,
    pub provider: ProviderKind,
    pub operation: OperationType,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Exact cost in pico-dollars
    pub cost_picos: u64,
    /// Cost rendered as USD with 6 decimals
    pub cost_usd: String,
    /// Credits requested for debit (0 for free operations)
    pub credits: i64,
    pub rate_version: String,
    /// Unix timestamp (ms) of the record
    pub created_at: i64,
}

impl UsageRecord {
    /// Get total tokens
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Running totals for one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostLedger {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_picos: u64,
    pub credits: i64,
    pub calls: u32,
}

impl CostLedger {
    /// Fold one record into the totals
    pub fn add(&mut self, record: &UsageRecord) {
        self.input_tokens += record.input_tokens;
        self.output_tokens += record.output_tokens;
        self.cost_picos = self.cost_picos.saturating_add(record.cost_picos);
        self.credits += record.credits;
        self.calls += 1;
    }

    pub fn cost_usd(&self) -> String {
        format_usd(self.cost_picos)
    }
}

/// One provider's share of a cost summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCost {
    pub provider: ProviderKind,
    pub tokens: u64,
    pub cost_usd: String,
}

/// Cost of a batch of reported token counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    pub total_tokens: u64,
    pub total_cost_picos: u64,
    pub total_cost_usd: String,
    pub breakdown: Vec<ProviderCost>,
    pub rate_version: String,
}
