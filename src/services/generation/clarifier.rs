//! Clarifying Question Engine
//!
//! Turns low-confidence parameters into a short list of structured Arabic
//! questions, and folds the user's answers back into the parameter set.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use bunyan_core::{DetectedParameters, ParameterKey, ParameterValue};

use crate::models::generation::{ClarifyingAnswers, ClarifyingQuestion, QuestionOption};

/// Default number of questions shown at once
pub const DEFAULT_QUESTION_BUDGET: usize = 3;

/// Arabic question text for a key
fn question_text(key: ParameterKey) -> &'static str {
    match key {
        ParameterKey::BusinessType => "ما نوع النشاط أو المشروع الذي تريد بناء التطبيق له؟",
        ParameterKey::AppName => "ما الاسم الذي تريده للتطبيق؟",
        ParameterKey::TargetAudience => "من هم المستخدمون المستهدفون؟",
        ParameterKey::Pages => "ما الصفحات التي يحتاجها التطبيق؟",
        ParameterKey::Features => "ما الميزات الأساسية التي تريدها؟",
        ParameterKey::PaymentMethod => "كيف سيدفع العملاء؟",
        ParameterKey::Shipping => "كيف سيتم توصيل الطلبات؟",
        ParameterKey::Language => "ما لغة واجهة التطبيق؟",
        ParameterKey::DesignStyle => "ما الطابع البصري المفضل للتصميم؟",
    }
}

/// Arabic label for a choice option
fn option_label(value: &str) -> &'static str {
    match value {
        "cod" => "الدفع عند الاستلام",
        "card" => "بطاقة ائتمانية",
        "bankTransfer" => "تحويل بنكي",
        "wallet" => "محفظة إلكترونية",
        "local" => "توصيل داخل المدينة",
        "national" => "شحن داخل الدولة",
        "international" => "شحن دولي",
        "pickup" => "استلام من المتجر",
        "ar" => "العربية",
        "en" => "الإنجليزية",
        "bilingual" => "العربية والإنجليزية",
        "modern" => "عصري",
        "classic" => "كلاسيكي",
        "minimal" => "بسيط",
        "playful" => "مرح",
        _ => "",
    }
}

fn question_for(key: ParameterKey, confidence: f64) -> ClarifyingQuestion {
    ClarifyingQuestion {
        id: key.as_str().to_string(),
        key,
        text: question_text(key).to_string(),
        options: key
            .options()
            .iter()
            .map(|value| QuestionOption {
                value: (*value).to_string(),
                label: option_label(value).to_string(),
            })
            .collect(),
        multiple: matches!(key, ParameterKey::Pages | ParameterKey::Features),
        priority: key.priority(),
        confidence,
    }
}

/// Questions for applicable keys below `threshold`, highest priority first,
/// truncated to `budget`. Empty when everything is confident.
pub fn generate_questions(
    parameters: &DetectedParameters,
    threshold: f64,
    budget: usize,
) -> Vec<ClarifyingQuestion> {
    let mut keys: Vec<ParameterKey> = parameters
        .applicable_keys()
        .into_iter()
        .filter(|k| parameters.confidence_of(*k) < threshold)
        .collect();
    keys.sort_by(|a, b| b.priority().cmp(&a.priority()));

    keys.into_iter()
        .take(budget)
        .map(|k| question_for(k, parameters.confidence_of(k)))
        .collect()
}

/// Result of folding answers into a parameter set
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub parameters: DetectedParameters,
    /// Answer ids that were applied
    pub applied: Vec<String>,
    /// Answer ids that were unknown or did not fit their key
    pub ignored: Vec<String>,
}

/// Overwrite each answered field with the answer at confidence 1.0.
///
/// The required-key set is frozen as it was before the merge, so overall
/// confidence never drops. Idempotent: merging the same answers twice gives
/// the same set.
pub fn merge_answers(parameters: &DetectedParameters, answers: &ClarifyingAnswers) -> MergeOutcome {
    let mut merged = parameters.clone();
    // answers fill in values; they never add required keys
    merged.freeze_requirements();
    let mut applied = Vec::new();
    let mut ignored = Vec::new();

    for (id, raw) in answers {
        let Ok(key) = id.parse::<ParameterKey>() else {
            ignored.push(id.clone());
            continue;
        };
        let value = normalize_answer(key, raw).and_then(|v| ParameterValue::from_json(key, &v));
        let Some(value) = value else {
            ignored.push(id.clone());
            continue;
        };
        match merged.set(key, value, 1.0) {
            Ok(()) => applied.push(id.clone()),
            Err(_) => ignored.push(id.clone()),
        }
    }
    if applied.is_empty() {
        merged.commerce = parameters.commerce;
    }

    if !ignored.is_empty() {
        debug!(ignored = ?ignored, "answers ignored");
    }
    MergeOutcome {
        parameters: merged,
        applied,
        ignored,
    }
}

/// Accept an option label in place of its value, and drop duplicate list items
fn normalize_answer(key: ParameterKey, raw: &Value) -> Option<Value> {
    match raw {
        Value::String(s) if !key.options().is_empty() => {
            let trimmed = s.trim();
            let value = key
                .options()
                .iter()
                .find(|opt| **opt == trimmed || option_label(opt) == trimmed)
                .map(|opt| (*opt).to_string())
                .unwrap_or_else(|| trimmed.to_string());
            Some(Value::String(value))
        }
        Value::Array(items) => {
            let mut seen = BTreeSet::new();
            let unique: Vec<Value> = items
                .iter()
                .filter(|v| v.as_str().map(|s| seen.insert(s.trim().to_string())).unwrap_or(false))
                .cloned()
                .collect();
            Some(Value::Array(unique))
        }
        Value::String(_) => Some(raw.clone()),
        _ => None,
    }
}
