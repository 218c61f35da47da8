use serde::{Deserialize, Serialize};

/// Outcome of a single consistency check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub name: String,
    pub status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Consistency report for the generation currently served.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub generation: u64,
    pub fragment_count: usize,
    pub vector_count: usize,
    pub dimension: usize,
    pub checks: Vec<VerificationCheck>,
    pub overall_status: VerificationStatus,
}

impl VerificationReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.overall_status != VerificationStatus::Failed
    }

    #[must_use]
    pub fn failed_checks(&self) -> impl Iterator<Item = &VerificationCheck> {
        self.checks
            .iter()
            .filter(|check| check.status == VerificationStatus::Failed)
    }
}
