//! Generation Planner
//!
//! Optional planning-provider call that sketches the app's sections before
//! generation. The plan is advisory: it is carried into the constructed
//! prompt unchanged, and a reply that cannot be parsed yields no plan.

use std::sync::Arc;

use tracing::{debug, warn};

use bunyan_core::DetectedParameters;
use bunyan_llm::extract::extract_json_object;
use bunyan_llm::{call_bounded, CallPolicy, PlanningProvider, ProviderKind, TokenUsage};

use crate::models::generation::GenerationPlan;
use crate::utils::error::AppResult;

use super::prompt::build_planning_instructions;

const PLANNING_TEMPERATURE: f32 = 0.4;
const MAX_PLAN_SECTIONS: usize = 8;

/// Plan plus the usage of the call that produced it
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Option<GenerationPlan>,
    pub usage: TokenUsage,
    pub provider: ProviderKind,
}

pub struct GenerationPlanner {
    provider: Arc<dyn PlanningProvider>,
    policy: CallPolicy,
}

impl GenerationPlanner {
    pub fn new(provider: Arc<dyn PlanningProvider>, policy: CallPolicy) -> Self {
        Self { provider, policy }
    }

    /// Ask the planning provider for a plan. Provider errors propagate;
    /// unparseable replies become `plan: None`.
    pub async fn plan(&self, original_prompt: &str, parameters: &DetectedParameters) -> AppResult<PlanOutcome> {
        let instructions = build_planning_instructions(original_prompt, parameters);
        let provider = self.provider.clone();
        let completion = call_bounded(&self.policy, "planning", || {
            let provider = provider.clone();
            let instructions = instructions.clone();
            async move { provider.complete(&instructions, Some(PLANNING_TEMPERATURE)).await }
        })
        .await?;

        let plan = parse_plan(&completion.text);
        match &plan {
            Some(p) => debug!(sections = p.sections.len(), "generation plan ready"),
            None => warn!("planning reply had no usable plan, continuing without one"),
        }

        Ok(PlanOutcome {
            plan,
            usage: completion.usage,
            provider: self.provider.kind(),
        })
    }
}

/// Parse a plan reply; `None` when there is nothing usable
pub fn parse_plan(text: &str) -> Option<GenerationPlan> {
    let json_str = extract_json_object(text)?;
    let mut plan: GenerationPlan = serde_json::from_str(&json_str).ok()?;
    plan.sections.retain(|s| !s.name.trim().is_empty());
    plan.sections.truncate(MAX_PLAN_SECTIONS);
    (!plan.is_empty()).then_some(plan)
}
