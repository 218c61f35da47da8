//! Consistency checks over the generation a handle currently serves.
//!
//! Verification is read-only: it reports problems and leaves repair to a rebuild.

use crate::constants::UNIT_NORM_EPSILON;
use crate::docia::lifecycle::{Docia, IndexGeneration};
use crate::types::{VerificationCheck, VerificationReport, VerificationStatus};
use crate::Result;

impl Docia {
    /// Verify the served generation: alignment, positions, normalized text, vector norms
    /// and dimension.
    pub fn verify(&self) -> Result<VerificationReport> {
        let generation = self.snapshot()?;
        let report = verify_generation(&generation, self.embedder.dimension());
        if report.is_healthy() {
            tracing::debug!(generation = report.generation, "index verification passed");
        } else {
            for check in report.failed_checks() {
                tracing::warn!(
                    check = %check.name,
                    detail = check.detail.as_deref().unwrap_or_default(),
                    "index verification failed"
                );
            }
        }
        Ok(report)
    }
}

pub(crate) fn verify_generation(
    generation: &IndexGeneration,
    expected_dimension: usize,
) -> VerificationReport {
    let vectors = generation.vectors();
    let store = generation.store();
    let mut checks = Vec::with_capacity(5);

    checks.push(check("aligned_lengths", || {
        (vectors.len() != store.len())
            .then(|| format!("{} vectors but {} fragments", vectors.len(), store.len()))
    }));

    checks.push(check("contiguous_positions", || {
        store
            .iter()
            .enumerate()
            .find(|(slot, record)| record.position() != *slot)
            .map(|(slot, record)| format!("slot {slot} holds position {}", record.position()))
    }));

    checks.push(check("normalized_text", || {
        let stale = store
            .iter()
            .filter(|record| !record.has_consistent_normalization())
            .count();
        (stale > 0).then(|| format!("{stale} fragments with stale normalized text"))
    }));

    checks.push(if vectors.is_empty() {
        skipped("unit_norms", "index holds no vectors")
    } else {
        check("unit_norms", || {
            vectors
                .iter()
                .enumerate()
                .map(|(position, vector)| {
                    (position, vector.iter().map(|x| x * x).sum::<f32>().sqrt())
                })
                .find(|(_, norm)| (norm - 1.0).abs() > UNIT_NORM_EPSILON)
                .map(|(position, norm)| format!("vector {position} has norm {norm:.4}"))
        })
    });

    checks.push(check("dimension", || {
        (vectors.dimension() != expected_dimension).then(|| {
            format!(
                "index dimension {} but embedder produces {expected_dimension}",
                vectors.dimension()
            )
        })
    }));

    let overall_status = if checks
        .iter()
        .any(|check| check.status == VerificationStatus::Failed)
    {
        VerificationStatus::Failed
    } else {
        VerificationStatus::Passed
    };

    VerificationReport {
        generation: generation.generation(),
        fragment_count: store.len(),
        vector_count: vectors.len(),
        dimension: vectors.dimension(),
        checks,
        overall_status,
    }
}

/// Run `detect`; a returned detail marks the check failed.
fn check(name: &str, detect: impl FnOnce() -> Option<String>) -> VerificationCheck {
    match detect() {
        None => VerificationCheck {
            name: name.to_string(),
            status: VerificationStatus::Passed,
            detail: None,
        },
        Some(detail) => VerificationCheck {
            name: name.to_string(),
            status: VerificationStatus::Failed,
            detail: Some(detail),
        },
    }
}

fn skipped(name: &str, detail: &str) -> VerificationCheck {
    VerificationCheck {
        name: name.to_string(),
        status: VerificationStatus::Skipped,
        detail: Some(detail.to_string()),
    }
}
