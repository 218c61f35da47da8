//! Exact inner-product index over unit vectors.
//!
//! Vectors live in one flat buffer addressed by position. The index is append-only within
//! a generation; removing a document re-packs the survivors into a new index.

use std::cmp::Ordering;

use crate::{DociaError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VecSearchHit {
    pub position: usize,
    /// Inner product with the query; cosine similarity for unit vectors.
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VecIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VecIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Wrap a flat row-major buffer of `data.len() / dimension` vectors.
    pub fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 {
            if !data.is_empty() {
                return Err(DociaError::InvalidIndex {
                    reason: "vectors present with zero dimension".into(),
                });
            }
        } else if data.len() % dimension != 0 {
            return Err(DociaError::InvalidIndex {
                reason: format!(
                    "vector buffer of {} floats is not a multiple of dimension {dimension}",
                    data.len()
                ),
            });
        }
        Ok(Self { dimension, data })
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Append `vectors` in order. Nothing is appended if any vector has the wrong dimension.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(DociaError::VecDimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Append one vector.
    pub fn push(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(DociaError::VecDimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    #[must_use]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// Up to `k` nearest vectors by inner product, best first; ties go to the lower position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VecSearchHit>> {
        if query.len() != self.dimension {
            return Err(DociaError::VecDimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<VecSearchHit> = self
            .iter()
            .enumerate()
            .map(|(position, vector)| VecSearchHit {
                position,
                score: dot(query, vector),
            })
            .collect();

        if hits.len() > k {
            hits.select_nth_unstable_by(k - 1, rank_order);
            hits.truncate(k);
        }
        hits.sort_by(rank_order);
        Ok(hits)
    }

    /// Discard every stored vector, keeping the dimension.
    pub fn rebuild(&mut self) {
        self.data.clear();
    }
}

fn rank_order(a: &VecSearchHit, b: &VecSearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
