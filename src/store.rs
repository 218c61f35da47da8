//! Positional fragment store aligned slot-for-slot with the vector index.

use crate::types::{DocumentId, FragmentRecord, SourceDocument};
use crate::{DociaError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentStore {
    records: Vec<FragmentRecord>,
}

impl FragmentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt persisted records, which must carry contiguous positions from zero.
    ///
    /// Records whose normalized text disagrees with the current normalizer are repaired;
    /// the number of repairs is returned alongside the store.
    pub fn from_records(mut records: Vec<FragmentRecord>) -> Result<(Self, usize)> {
        let mut repaired = 0usize;
        for (slot, record) in records.iter_mut().enumerate() {
            if record.position != slot {
                return Err(DociaError::InvalidIndex {
                    reason: format!(
                        "fragment at slot {slot} records position {}",
                        record.position
                    ),
                });
            }
            if record.renormalize() {
                repaired += 1;
            }
        }
        Ok((Self { records }, repaired))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&FragmentRecord> {
        self.records.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FragmentRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn records(&self) -> &[FragmentRecord] {
        &self.records
    }

    /// Append one record per text, all belonging to `document`, at the next positions.
    pub fn append(&mut self, document: &SourceDocument, texts: Vec<String>) {
        let start = self.records.len();
        self.records.extend(
            texts
                .into_iter()
                .enumerate()
                .map(|(offset, text)| FragmentRecord::from_document(start + offset, text, document)),
        );
    }

    /// Re-append an existing record at the next position.
    pub(crate) fn push_renumbered(&mut self, mut record: FragmentRecord) {
        record.position = self.records.len();
        self.records.push(record);
    }

    /// Discard every record.
    pub fn rebuild(&mut self) {
        self.records.clear();
    }

    pub fn positions_of(&self, document_id: DocumentId) -> impl Iterator<Item = usize> + '_ {
        self.records
            .iter()
            .filter(move |record| record.document_id == document_id)
            .map(FragmentRecord::position)
    }

    #[must_use]
    pub fn contains_document(&self, document_id: DocumentId) -> bool {
        self.records
            .iter()
            .any(|record| record.document_id == document_id)
    }
}
