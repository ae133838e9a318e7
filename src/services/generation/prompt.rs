//! Prompt Constructor
//!
//! Pure assembly of the final generation instruction from the original
//! request, the merged parameters, and an optional plan. Every set parameter
//! is included, whatever its confidence.

use bunyan_core::{DetectedParameters, ParameterKey, ParameterValue};

use crate::models::generation::{Complexity, ConstructedPrompt, GenerationPlan};

/// System prompt sent with every generation call
pub const GENERATION_SYSTEM_PROMPT: &str = "You are a senior front-end engineer. \
Produce one complete, self-contained HTML document (inline CSS and JavaScript, no external \
build step). Write all user-facing text in the language requested. For Arabic interfaces set \
dir=\"rtl\" and lang=\"ar\" on <html>. Include <!DOCTYPE html>, <meta charset=\"utf-8\"> and a \
responsive viewport meta tag. Never use eval, document.write or inline javascript: URLs. \
Return only the code.";

/// Arabic label used for each parameter in the constructed prompt
fn parameter_label(key: ParameterKey) -> &'static str {
    match key {
        ParameterKey::BusinessType => "نوع النشاط",
        ParameterKey::AppName => "اسم التطبيق",
        ParameterKey::TargetAudience => "الجمهور المستهدف",
        ParameterKey::Pages => "الصفحات",
        ParameterKey::Features => "الميزات",
        ParameterKey::PaymentMethod => "طريقة الدفع",
        ParameterKey::Shipping => "التوصيل",
        ParameterKey::Language => "اللغة",
        ParameterKey::DesignStyle => "أسلوب التصميم",
    }
}

fn list_len(parameters: &DetectedParameters, key: ParameterKey) -> usize {
    match parameters.get(key).map(|f| &f.value) {
        Some(ParameterValue::List(items)) => items.len(),
        _ => 0,
    }
}

/// Size estimate from page and feature counts (telemetry only)
pub fn estimate_complexity(parameters: &DetectedParameters, plan: Option<&GenerationPlan>) -> Complexity {
    let pages = list_len(parameters, ParameterKey::Pages)
        .max(plan.map(|p| p.sections.len()).unwrap_or(0));
    let features = list_len(parameters, ParameterKey::Features);

    if pages > 6 || features > 5 {
        Complexity::Complex
    } else if pages <= 3 && features <= 2 {
        Complexity::Simple
    } else {
        Complexity::Moderate
    }
}

/// Build the final instruction text
pub fn construct(
    original_prompt: &str,
    parameters: &DetectedParameters,
    plan: Option<&GenerationPlan>,
) -> ConstructedPrompt {
    let complexity = estimate_complexity(parameters, plan);
    let mut text = String::new();

    text.push_str("## الطلب الأصلي\n");
    text.push_str(original_prompt.trim());
    text.push_str("\n\n## المتطلبات\n");
    for key in ParameterKey::ALL {
        if let Some(field) = parameters.get(key) {
            text.push_str(&format!(
                "- {} ({}): {}\n",
                parameter_label(key),
                key.as_str(),
                field.value.display()
            ));
        }
    }

    if let Some(plan) = plan.filter(|p| !p.is_empty()) {
        text.push_str("\n## الخطة\n");
        for section in &plan.sections {
            if section.purpose.is_empty() {
                text.push_str(&format!("- {}\n", section.name));
            } else {
                text.push_str(&format!("- {}: {}\n", section.name, section.purpose));
            }
        }
        for note in &plan.notes {
            text.push_str(&format!("* {}\n", note));
        }
    }

    ConstructedPrompt { text, complexity }
}

/// Instructions for the optional planning call
pub fn build_planning_instructions(original_prompt: &str, parameters: &DetectedParameters) -> String {
    let mut requirements = String::new();
    for (key, field) in &parameters.fields {
        requirements.push_str(&format!("- {}: {}\n", key.as_str(), field.value.display()));
    }
    format!(
        "Plan the structure of a single-page web application for the request below.\n\
         Respond with ONLY a JSON object:\n\
         {{\"sections\": [{{\"name\": \"...\", \"purpose\": \"...\"}}], \"notes\": [\"...\"]}}\n\
         Use at most 8 sections. Write names and purposes in the request's language.\n\n\
         ## Requirements\n{requirements}\n\
         ## Request\n{}\n",
        original_prompt.trim()
    )
}
