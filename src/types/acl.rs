//! Requester context and access-filter statistics.

use serde::{Deserialize, Serialize};

/// Identity of the caller a retrieval is performed for.
///
/// `general_access` bypasses every visibility check. Otherwise a fragment is visible only
/// when its document is reviewed and it belongs to no department or to the requester's.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct Requester {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_code: Option<String>,
    #[serde(default)]
    pub general_access: bool,
}

impl Requester {
    /// Requester allowed to see every fragment.
    #[must_use]
    pub fn general() -> Self {
        Self {
            department_code: None,
            general_access: true,
        }
    }

    #[must_use]
    pub fn department(code: impl Into<String>) -> Self {
        Self {
            department_code: Some(code.into()),
            general_access: false,
        }
    }

    /// Requester without general access or a department.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Counters collected while the access filter runs over semantic hits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclFilterStats {
    pub allowed: usize,
    pub denied_unreviewed: usize,
    pub denied_department: usize,
}

impl AclFilterStats {
    #[must_use]
    pub fn denied(&self) -> usize {
        self.denied_unreviewed + self.denied_department
    }
}
