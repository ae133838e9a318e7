//! Cost Calculator
//!
//! Converts provider token counts into exact pico-dollar costs using a
//! versioned per-provider rate table. Custom overrides take precedence over
//! the built-in rates.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use bunyan_llm::ProviderKind;

use crate::models::analytics::{format_usd, CostSummary, ProviderCost, ProviderRate, RATE_TABLE_VERSION};
use crate::utils::error::{AppError, AppResult};

/// Built-in rates (micro-dollars per million tokens)
fn get_default_rates() -> Vec<ProviderRate> {
    vec![
        // Gemini Pro: $0.50 / 1M tokens
        ProviderRate::new(ProviderKind::GeminiPro, 500_000),
        // DeepSeek chat: $0.14 / 1M tokens
        ProviderRate::new(ProviderKind::DeepSeek, 140_000),
    ]
}

/// Cost calculator for provider usage
#[derive(Debug)]
pub struct CostCalculator {
    rates: RwLock<HashMap<ProviderKind, ProviderRate>>,
    custom_overrides: RwLock<HashMap<ProviderKind, ProviderRate>>,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl CostCalculator {
    /// Create a calculator with the built-in rate table
    pub fn new() -> Self {
        let rates = get_default_rates()
            .into_iter()
            .map(|rate| (rate.provider, rate))
            .collect();

        Self {
            rates: RwLock::new(rates),
            custom_overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Rate for a provider, custom override first
    pub fn get_rate(&self, provider: ProviderKind) -> Option<ProviderRate> {
        if let Ok(custom) = self.custom_overrides.read() {
            if let Some(rate) = custom.get(&provider) {
                return Some(rate.clone());
            }
        }
        self.rates
            .read()
            .ok()
            .and_then(|rates| rates.get(&provider).cloned())
    }

    /// Exact cost of one call in pico-dollars
    pub fn calculate_cost(
        &self,
        provider: ProviderKind,
        input_tokens: u64,
        output_tokens: u64,
    ) -> AppResult<u64> {
        let rate = self
            .get_rate(provider)
            .ok_or_else(|| AppError::UnknownProvider(provider.to_string()))?;
        Ok(rate.cost_picos(input_tokens.saturating_add(output_tokens)))
    }

    /// Cost a client-reported `{provider name: total tokens}` map.
    ///
    /// A name outside the rate table is an `UNKNOWN_PROVIDER` error.
    pub fn cost_tokens_used(&self, tokens_used: &BTreeMap<String, u64>) -> AppResult<CostSummary> {
        let mut breakdown = Vec::with_capacity(tokens_used.len());
        let mut total_tokens: u64 = 0;
        let mut total_cost_picos: u64 = 0;

        for (name, &tokens) in tokens_used {
            let provider = ProviderKind::parse(name)
                .ok_or_else(|| AppError::UnknownProvider(name.clone()))?;
            let cost = self.calculate_cost(provider, tokens, 0)?;
            total_tokens = total_tokens.saturating_add(tokens);
            total_cost_picos = total_cost_picos.saturating_add(cost);
            breakdown.push(ProviderCost {
                provider,
                tokens,
                cost_usd: format_usd(cost),
            });
        }

        Ok(CostSummary {
            total_tokens,
            total_cost_picos,
            total_cost_usd: format_usd(total_cost_picos),
            breakdown,
            rate_version: self.rate_version(),
        })
    }

    /// Set a custom rate for a provider
    pub fn set_custom_rate(&self, provider: ProviderKind, micros_per_million_tokens: u64) -> AppResult<()> {
        let mut custom = self
            .custom_overrides
            .write()
            .map_err(|_| AppError::internal("Failed to acquire custom overrides lock"))?;

        custom.insert(
            provider,
            ProviderRate {
                is_custom: true,
                version: format!("{}+custom", RATE_TABLE_VERSION),
                ..ProviderRate::new(provider, micros_per_million_tokens)
            },
        );
        Ok(())
    }

    /// Remove a custom rate; returns whether one existed
    pub fn remove_custom_rate(&self, provider: ProviderKind) -> AppResult<bool> {
        let mut custom = self
            .custom_overrides
            .write()
            .map_err(|_| AppError::internal("Failed to acquire custom overrides lock"))?;
        Ok(custom.remove(&provider).is_some())
    }

    /// Effective rate for every provider, sorted by provider
    pub fn get_all_rates(&self) -> Vec<ProviderRate> {
        let mut result: Vec<ProviderRate> = ProviderKind::ALL
            .iter()
            .filter_map(|p| self.get_rate(*p))
            .collect();
        result.sort_by_key(|r| r.provider);
        result
    }

    /// Version tag recorded on usage records
    pub fn rate_version(&self) -> String {
        let has_custom = self
            .custom_overrides
            .read()
            .map(|c| !c.is_empty())
            .unwrap_or(false);
        if has_custom {
            format!("{}+custom", RATE_TABLE_VERSION)
        } else {
            RATE_TABLE_VERSION.to_string()
        }
    }
}
