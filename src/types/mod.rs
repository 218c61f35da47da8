//! Public types exposed by the `docia-core` crate.

pub mod acl;
pub mod common;
pub mod document;
pub mod fragment;
pub mod options;
pub mod search;
pub mod verification;

pub use acl::{AclFilterStats, Requester};
pub use common::DocumentId;
pub use document::{DocumentSource, MemoryDocumentSource, SourceDocument};
pub use fragment::FragmentRecord;
pub use options::{
    EngineConfig, EngineConfigBuilder, MutationOptions, RetrievalDefaults, SplitOptions,
};
pub use search::{Candidate, RetrievalStage, RetrieveRequest, RetrieveResponse, StageReport};
pub use verification::{VerificationCheck, VerificationReport, VerificationStatus};

/// Outcome of an index mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MutationReport {
    /// Generation now being served.
    pub generation: u64,
    pub added: usize,
    pub removed: usize,
    pub total_fragments: usize,
}
