//! Per-run record of what happened to each rule.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Executed,
    Failed,
    Skipped,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executed => write!(f, "EXECUTED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Which gating check stopped a rule. Recorded so operators can tell
/// "intentionally inapplicable" apart from "broken".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Status,
    ExecutionGroup,
    DbVersion,
    SqlScriptVersion,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::ExecutionGroup => write!(f, "execution_group"),
            Self::DbVersion => write!(f, "db_version"),
            Self::SqlScriptVersion => write!(f, "sql_script_version"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub status: OutcomeStatus,
    pub skip_reason: Option<SkipReason>,
    pub detail: Option<String>,
}

impl RuleOutcome {
    pub fn executed() -> Self {
        Self {
            status: OutcomeStatus::Executed,
            skip_reason: None,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            skip_reason: None,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            skip_reason: Some(reason),
            detail: None,
        }
    }
}

/// Outcomes keyed by rule identifier.
pub type RuleOutcomes = BTreeMap<String, RuleOutcome>;
