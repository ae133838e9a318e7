//! Validation Pipeline
//!
//! `CodeValidator` runs the complete checklist (never short-circuits), appends
//! provider-reported issues as warnings, and optionally runs one auto-fix pass:
//! every fixable finding's fixer is applied in checklist order, then the fixed
//! code is validated again. The fix only counts when the fixed code passes.

use tracing::{debug, info};

use crate::checks::{CheckContext, CheckId};
use crate::models::{Finding, ProviderReport, ValidationResult};

/// Runs the checklist against generated code.
#[derive(Debug, Clone)]
pub struct CodeValidator {
    auto_fix: bool,
}

impl Default for CodeValidator {
    fn default() -> Self {
        Self { auto_fix: true }
    }
}

impl CodeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable or enable the auto-fix pass
    pub fn with_auto_fix(mut self, enabled: bool) -> Self {
        self.auto_fix = enabled;
        self
    }

    /// Validate `code` produced for `original_prompt`.
    pub fn validate(
        &self,
        code: &str,
        original_prompt: &str,
        report: &ProviderReport,
    ) -> ValidationResult {
        let ctx = CheckContext::for_prompt(original_prompt);
        let mut findings = run_checklist(code, &ctx);
        let passed = !has_blocking(&findings);

        let auto_fixed_code = if self.auto_fix {
            self.auto_fix_pass(code, &ctx, &mut findings)
        } else {
            None
        };

        findings.extend(report.issues.iter().map(Finding::provider));
        findings.extend(
            report
                .vulnerabilities
                .iter()
                .map(|v| Finding::provider(format!("Security: {}", v))),
        );

        info!(
            passed,
            findings = findings.len(),
            auto_fixed = auto_fixed_code.is_some(),
            arabic = ctx.arabic,
            "code validated"
        );

        ValidationResult {
            passed,
            findings,
            auto_fixed_code,
        }
    }

    /// Apply all available fixers and keep the result if it passes.
    ///
    /// Marks the findings the fix actually removed as `auto_fixed`.
    fn auto_fix_pass(
        &self,
        code: &str,
        ctx: &CheckContext,
        findings: &mut [Finding],
    ) -> Option<String> {
        let mut fixed = code.to_string();
        let mut applied = Vec::new();
        for finding in findings.iter().filter(|f| f.fixable) {
            let Some(check) = CheckId::parse(&finding.check) else {
                continue;
            };
            if let Some(next) = check.fix(&fixed, ctx) {
                fixed = next;
                applied.push(check);
            }
        }
        if applied.is_empty() {
            return None;
        }

        let after = run_checklist(&fixed, ctx);
        if has_blocking(&after) {
            debug!(
                remaining = after.len(),
                "auto-fix did not clear blocking findings; discarding"
            );
            return None;
        }

        let mut corrected = 0usize;
        for finding in findings.iter_mut() {
            let resolved = CheckId::parse(&finding.check)
                .map(|c| applied.contains(&c))
                .unwrap_or(false)
                && !after.iter().any(|a| a.check == finding.check);
            if resolved {
                finding.auto_fixed = true;
                corrected += 1;
            }
        }

        if corrected == 0 {
            None
        } else {
            Some(fixed)
        }
    }
}

/// Run every check in order
fn run_checklist(code: &str, ctx: &CheckContext) -> Vec<Finding> {
    CheckId::ALL
        .iter()
        .filter_map(|check| check.run(code, ctx))
        .collect()
}

fn has_blocking(findings: &[Finding]) -> bool {
    findings.iter().any(|f| f.severity.is_blocking())
}
