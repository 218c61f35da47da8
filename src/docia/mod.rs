//! Core `Docia` type: index lifecycle, maintenance and retrieval.

mod acl;
pub mod doctor;
pub mod lifecycle;
pub mod mutation;
pub mod search;

pub use acl::{is_document_visible, is_fragment_visible};
pub use lifecycle::{Docia, IndexGeneration};
