//! Quality Gates Models
//!
//! Data structures for validation findings and results.

use serde::{Deserialize, Serialize};

/// How serious a finding is. Only `Error` fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Check if this severity fails validation
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Where a finding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSource {
    /// One of the built-in checks
    Checklist,
    /// Reported by the generation provider alongside its output
    Provider,
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Check identifier (`"charset"`, `"provider-report"`, ...)
    pub check: String,
    pub severity: Severity,
    pub message: String,
    pub source: FindingSource,
    /// A fixer exists for this finding
    pub fixable: bool,
    /// The auto-fix pass corrected this finding
    #[serde(default)]
    pub auto_fixed: bool,
}

impl Finding {
    pub fn checklist(
        check: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        fixable: bool,
    ) -> Self {
        Self {
            check: check.into(),
            severity,
            message: message.into(),
            source: FindingSource::Checklist,
            fixable,
            auto_fixed: false,
        }
    }

    /// Provider-reported issues are always non-blocking
    pub fn provider(message: impl Into<String>) -> Self {
        Self {
            check: "provider-report".to_string(),
            severity: Severity::Warning,
            message: message.into(),
            source: FindingSource::Provider,
            fixable: false,
            auto_fixed: false,
        }
    }
}

/// Issues and vulnerabilities the generation provider attached to its output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReport {
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub vulnerabilities: Vec<String>,
}

impl ProviderReport {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.vulnerabilities.is_empty()
    }
}

/// Outcome of validating one piece of code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// No blocking finding on the code as submitted
    pub passed: bool,
    pub findings: Vec<Finding>,
    /// Present only when at least one finding was auto-corrected and the
    /// corrected code passes the checklist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_fixed_code: Option<String>,
}

impl ValidationResult {
    /// Number of findings at a given severity
    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    /// Failing code that the auto-fix pass rescued
    pub fn was_rescued(&self) -> bool {
        !self.passed && self.auto_fixed_code.is_some()
    }

    /// Acceptable as delivered or after auto-fix
    pub fn is_acceptable(&self) -> bool {
        self.passed || self.auto_fixed_code.is_some()
    }
}
