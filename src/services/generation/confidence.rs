//! Confidence Calculator
//!
//! Weighted mean of field confidences over the applicable keys (required keys
//! plus present keys). An absent required key contributes 0.

use bunyan_core::parameters::clamp_confidence;
use bunyan_core::DetectedParameters;

/// Default gate between clarifying and constructing
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Overall confidence of a parameter set, in [0, 1]
pub fn overall_confidence(parameters: &DetectedParameters) -> f64 {
    let keys = parameters.applicable_keys();
    let total_weight: f64 = keys.iter().map(|k| k.weight()).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }

    let weighted: f64 = keys
        .iter()
        .map(|k| k.weight() * parameters.confidence_of(*k))
        .sum();
    clamp_confidence(weighted / total_weight)
}

/// Whether the set is confident enough to skip clarification
pub fn meets_threshold(parameters: &DetectedParameters, threshold: f64) -> bool {
    overall_confidence(parameters) >= threshold
}
