//! Shared fixtures: scripted providers and an in-memory application state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use bunyan::services::analytics::{CostCalculator, UsageAccountant};
use bunyan::services::billing::SqliteCreditLedger;
use bunyan::services::generation::{GenerationOrchestrator, OrchestratorSettings, SqliteSessionStore};
use bunyan::storage::database::Database;
use bunyan::AppState;
use bunyan_llm::{
    CallPolicy, Completion, GeneratedCode, GenerationOptions, GenerationProvider, LlmError,
    LlmResult, PlanningProvider, ProviderKind, TokenUsage,
};

pub const USER: &str = "user-1";
pub const OTHER_USER: &str = "user-2";
pub const STORE_PROMPT: &str = "متجر إلكتروني لبيع الملابس";

/// Detection reply for the clothing store: confident business type and
/// pages, nothing about payment or shipping
pub const STORE_DETECTION: &str = r#"```json
{
  "businessType": {"value": "متجر إلكتروني لبيع الملابس", "confidence": 0.95},
  "pages": {"value": ["الرئيسية", "المنتجات", "السلة"], "confidence": 0.9}
}
```"#;

/// Detection reply that is confident about everything a store needs
pub const CONFIDENT_STORE_DETECTION: &str = r#"{
  "businessType": {"value": "متجر عطور", "confidence": 1.0},
  "pages": {"value": ["الرئيسية", "المنتجات"], "confidence": 0.9},
  "paymentMethod": {"value": "card", "confidence": 0.9},
  "shipping": {"value": "national", "confidence": 0.85}
}"#;

/// Code that passes the full checklist for an Arabic prompt
pub const VALID_ARABIC_HTML: &str = r#"<!DOCTYPE html>
<html lang="ar" dir="rtl">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>متجر الملابس</title>
</head>
<body>
<h1>مرحباً بكم</h1>
</body>
</html>"#;

// ============================================================================
// Scripted providers
// ============================================================================

/// Planning provider that answers from a queue of scripted replies
pub struct ScriptedPlanner {
    replies: Mutex<VecDeque<LlmResult<String>>>,
    pub calls: AtomicU32,
}

impl ScriptedPlanner {
    pub fn new(replies: Vec<LlmResult<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanningProvider for ScriptedPlanner {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GeminiPro
    }

    async fn complete(&self, _instructions: &str, _temperature: Option<f32>) -> LlmResult<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(LlmError::Other {
                message: "no scripted reply left".into(),
            })
        });
        reply.map(|text| Completion {
            text,
            usage: TokenUsage::new(80, 20),
            model: "gemini-1.5-pro".into(),
        })
    }
}

/// Generation provider with a fixed outcome
pub struct MockGenerator {
    outcome: Mutex<LlmResult<GeneratedCode>>,
    pub calls: AtomicU32,
}

impl MockGenerator {
    pub fn returning(code: &str) -> Self {
        Self {
            outcome: Mutex::new(Ok(GeneratedCode {
                code: code.to_string(),
                usage: TokenUsage::new(500, 1500),
                model: "deepseek-chat".into(),
                issues: vec![],
                vulnerabilities: vec![],
            })),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(error: LlmError) -> Self {
        Self {
            outcome: Mutex::new(Err(error)),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for MockGenerator {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> LlmResult<GeneratedCode> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.lock().unwrap().clone()
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub state: AppState,
    pub planner: Arc<ScriptedPlanner>,
    pub generator: Arc<MockGenerator>,
    pub credits: Arc<SqliteCreditLedger>,
    pub store: Arc<SqliteSessionStore>,
}

pub fn fast_settings(enable_planning: bool) -> OrchestratorSettings {
    OrchestratorSettings {
        enable_planning,
        call_policy: CallPolicy {
            timeout: Duration::from_secs(5),
            retries: 1,
            retry_delay: Duration::from_millis(1),
        },
        ..Default::default()
    }
}

pub fn harness_with(planner: ScriptedPlanner, generator: MockGenerator, settings: OrchestratorSettings) -> Harness {
    let database = Database::new_in_memory().unwrap();
    let pool = database.pool().clone();

    let planner = Arc::new(planner);
    let generator = Arc::new(generator);
    let credits = Arc::new(SqliteCreditLedger::new(pool.clone()));
    let store = Arc::new(SqliteSessionStore::new(pool.clone()));
    let accountant = Arc::new(UsageAccountant::new(pool, Arc::new(CostCalculator::new())));

    let orchestrator = GenerationOrchestrator::new(
        store.clone(),
        planner.clone(),
        generator.clone(),
        credits.clone(),
        accountant,
        settings,
    );
    let state = AppState::from_parts(database, None, credits.clone(), Arc::new(orchestrator));

    Harness {
        state,
        planner,
        generator,
        credits,
        store,
    }
}

pub fn harness(detection_replies: &[&str], generated_code: &str) -> Harness {
    let replies = detection_replies.iter().map(|r| Ok(r.to_string())).collect();
    harness_with(
        ScriptedPlanner::new(replies),
        MockGenerator::returning(generated_code),
        fast_settings(false),
    )
}
