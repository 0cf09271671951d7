//! Verdicts returned by the rate limiter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why a submission was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Too many submissions inside the current burst window
    TooFast,
    /// The client reached its lifetime submission cap
    SubmissionLimitExceeded,
}

impl ReasonCode {
    /// Stable string form used as the error key by callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::TooFast => "too_fast",
            ReasonCode::SubmissionLimitExceeded => "submission_limit_exceeded",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub admitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Decision {
    pub fn admit() -> Self {
        Self {
            admitted: true,
            reason: None,
            message: None,
        }
    }

    pub fn reject(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            admitted: false,
            reason: Some(reason),
            message: Some(message.into()),
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.admitted
    }

    /// Merge a rejection into a caller's error map keyed by reason code.
    ///
    /// Admitted decisions leave the map untouched.
    pub fn apply_to(&self, errors: &mut BTreeMap<String, String>) {
        if let Some(reason) = self.reason {
            errors.insert(
                reason.as_str().to_string(),
                self.message.clone().unwrap_or_default(),
            );
        }
    }
}
