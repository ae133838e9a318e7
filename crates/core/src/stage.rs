//! Session Stage Machine
//!
//! The ordered stages a generation session moves through, and the rules for
//! which moves are legal.
//!
//! ```text
//! detection -> clarifying <-> constructing -> generating -> validating -> completed
//!     \            \              \               \             \
//!      +------------+--------------+---------------+-------------+--> failed
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Stage of a generation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStage {
    /// Parameters are being detected from the prompt
    Detection,
    /// Waiting for the user to answer clarifying questions
    Clarifying,
    /// Confident enough; the generation prompt is being assembled
    Constructing,
    /// The generation provider is producing code
    Generating,
    /// Generated code is being checked
    Validating,
    /// Terminal: code generated and accepted
    Completed,
    /// Terminal: a provider failed or validation could not be fixed
    Failed,
}

impl SessionStage {
    /// Every stage in pipeline order
    pub const ALL: [SessionStage; 7] = [
        SessionStage::Detection,
        SessionStage::Clarifying,
        SessionStage::Constructing,
        SessionStage::Generating,
        SessionStage::Validating,
        SessionStage::Completed,
        SessionStage::Failed,
    ];

    /// Get the string form for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detection => "detection",
            Self::Clarifying => "clarifying",
            Self::Constructing => "constructing",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stages in which a session must carry its constructed prompt
    pub fn carries_constructed_prompt(&self) -> bool {
        matches!(self, Self::Generating | Self::Validating | Self::Completed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Staying in the same stage is legal for `clarifying` (another round of
    /// questions) and `constructing` (answers or a refinement that keeps
    /// confidence above threshold). `constructing -> clarifying` is the only
    /// backwards move and happens when a re-detection lowers confidence.
    pub fn can_transition_to(&self, next: SessionStage) -> bool {
        use SessionStage::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }

        matches!(
            (self, next),
            (Detection, Clarifying)
                | (Detection, Constructing)
                | (Clarifying, Clarifying)
                | (Clarifying, Constructing)
                | (Constructing, Constructing)
                | (Constructing, Clarifying)
                | (Constructing, Generating)
                | (Generating, Validating)
                | (Validating, Completed)
        )
    }

    /// Check a transition, returning the target stage when legal
    pub fn transition(&self, next: SessionStage) -> CoreResult<SessionStage> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::invalid_transition(self.as_str(), next.as_str()))
        }
    }
}

impl std::fmt::Display for SessionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| CoreError::parse(format!("unknown session stage: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_string_roundtrip() {
        for stage in SessionStage::ALL {
            assert_eq!(stage.as_str().parse::<SessionStage>().unwrap(), stage);
        }
        assert!("drafting".parse::<SessionStage>().is_err());
    }

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            SessionStage::Detection,
            SessionStage::Clarifying,
            SessionStage::Clarifying,
            SessionStage::Constructing,
            SessionStage::Generating,
            SessionStage::Validating,
            SessionStage::Completed,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_any_non_terminal_can_fail() {
        for stage in SessionStage::ALL {
            assert_eq!(
                stage.can_transition_to(SessionStage::Failed),
                !stage.is_terminal()
            );
        }
    }

    #[test]
    fn test_terminal_stages_never_move() {
        for next in SessionStage::ALL {
            assert!(!SessionStage::Completed.can_transition_to(next));
            assert!(!SessionStage::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_skipping_stages_is_illegal() {
        assert!(!SessionStage::Detection.can_transition_to(SessionStage::Generating));
        assert!(!SessionStage::Clarifying.can_transition_to(SessionStage::Generating));
        assert!(!SessionStage::Generating.can_transition_to(SessionStage::Completed));
        assert!(!SessionStage::Validating.can_transition_to(SessionStage::Clarifying));
        assert!(!SessionStage::Detection.can_transition_to(SessionStage::Detection));
    }

    #[test]
    fn test_transition_error() {
        let err = SessionStage::Completed
            .transition(SessionStage::Clarifying)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(
            SessionStage::Constructing
                .transition(SessionStage::Clarifying)
                .unwrap(),
            SessionStage::Clarifying
        );
    }

    #[test]
    fn test_constructed_prompt_stages() {
        let carrying: Vec<_> = SessionStage::ALL
            .iter()
            .filter(|s| s.carries_constructed_prompt())
            .collect();
        assert_eq!(carrying.len(), 3);
        assert!(!SessionStage::Failed.carries_constructed_prompt());
    }
}
