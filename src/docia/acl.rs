use crate::types::{AclFilterStats, FragmentRecord, Requester, SourceDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AclDecision {
    Allow,
    DenyUnreviewed,
    DenyDepartment,
}

impl AclFilterStats {
    pub(crate) fn record(&mut self, decision: AclDecision) {
        match decision {
            AclDecision::Allow => self.allowed += 1,
            AclDecision::DenyUnreviewed => self.denied_unreviewed += 1,
            AclDecision::DenyDepartment => self.denied_department += 1,
        }
    }
}

/// Fragment-level rule applied to semantic hits.
///
/// General access sees everything. Anyone else needs a reviewed fragment that either has
/// no department or shares the requester's.
pub(crate) fn evaluate_fragment(record: &FragmentRecord, requester: &Requester) -> AclDecision {
    if requester.general_access {
        return AclDecision::Allow;
    }
    if !record.reviewed {
        return AclDecision::DenyUnreviewed;
    }
    let Some(fragment_department) = normalize_code(record.department_code.as_deref()) else {
        return AclDecision::Allow;
    };
    match normalize_code(requester.department_code.as_deref()) {
        Some(requester_department) if requester_department == fragment_department => {
            AclDecision::Allow
        }
        _ => AclDecision::DenyDepartment,
    }
}

#[must_use]
pub fn is_fragment_visible(record: &FragmentRecord, requester: &Requester) -> bool {
    evaluate_fragment(record, requester) == AclDecision::Allow
}

/// Document-level listing rule.
///
/// Unreviewed documents are hidden from everyone. General access sees every reviewed
/// document; a requester without a department sees none; otherwise departments must match.
#[must_use]
pub fn is_document_visible(document: &SourceDocument, requester: &Requester) -> bool {
    if !document.reviewed {
        return false;
    }
    if requester.general_access {
        return true;
    }
    let Some(requester_department) = normalize_code(requester.department_code.as_deref()) else {
        return false;
    };
    normalize_code(document.department_code.as_deref())
        .is_some_and(|department| department == requester_department)
}

fn normalize_code(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_lowercase())
    }
}
