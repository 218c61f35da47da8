//! On-disk representation of an index generation.

pub mod artifacts;

use bincode::config::{self, Config};

pub use artifacts::{ArtifactPaths, ArtifactStamp, LoadedArtifacts};

/// Encoding shared by every bincode artifact; fixed-width so sizes are predictable.
pub(crate) fn artifact_config() -> impl Config {
    config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}
