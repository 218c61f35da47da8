//! The two aligned artifacts of an index generation.
//!
//! `fragments.vec` layout (little endian):
//! `[magic: 8][version: u16][reserved: u16][dimension: u32][count: u64][f32 * count * dimension][blake3: 32]`
//! where the checksum covers everything before it.
//!
//! `fragments.bin` is a bincode record carrying the generation, the embedding model name,
//! the vector count and the vector blob checksum, followed by the fragment array. A pair
//! whose count or checksum disagree was not committed together and is rejected.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use atomic_write_file::AtomicWriteFile;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};

use super::artifact_config;
use crate::constants::{
    FRAGMENTS_FILE_NAME, FRAGMENTS_FORMAT_VERSION, LOCK_FILE_NAME, VECTORS_FILE_NAME,
    VECTORS_FORMAT_VERSION, VECTORS_MAGIC,
};
use crate::lock::IndexLock;
use crate::store::FragmentStore;
use crate::types::FragmentRecord;
use crate::vec::VecIndex;
use crate::{DociaError, Result};

const VECTORS_HEADER_SIZE: usize = 24;
const CHECKSUM_SIZE: usize = 32;

/// Locations of the artifact pair and its lock file inside a storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub vectors: PathBuf,
    pub fragments: PathBuf,
    pub lock: PathBuf,
}

impl ArtifactPaths {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            vectors: dir.join(VECTORS_FILE_NAME),
            fragments: dir.join(FRAGMENTS_FILE_NAME),
            lock: dir.join(LOCK_FILE_NAME),
            dir,
        }
    }

    #[must_use]
    pub fn exist(&self) -> bool {
        self.vectors.is_file() && self.fragments.is_file()
    }

    /// Current size and mtime of both artifacts, used to notice external rewrites.
    #[must_use]
    pub fn stamp(&self) -> ArtifactStamp {
        ArtifactStamp {
            vectors: FileStamp::of(&self.vectors),
            fragments: FileStamp::of(&self.fragments),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtifactStamp {
    pub vectors: Option<FileStamp>,
    pub fragments: Option<FileStamp>,
}

#[derive(Serialize)]
struct FragmentsFileRef<'a> {
    format_version: u16,
    generation: u64,
    model_name: &'a str,
    dimension: u64,
    vector_count: u64,
    vectors_checksum: [u8; 32],
    fragments: &'a [FragmentRecord],
}

#[derive(Deserialize)]
struct FragmentsFile {
    format_version: u16,
    generation: u64,
    model_name: String,
    dimension: u64,
    vector_count: u64,
    vectors_checksum: [u8; 32],
    fragments: Vec<FragmentRecord>,
}

/// A generation read back from disk.
#[derive(Debug)]
pub struct LoadedArtifacts {
    pub generation: u64,
    pub model_name: String,
    pub vectors: VecIndex,
    pub store: FragmentStore,
    /// Fragments whose persisted normalized text had to be recomputed.
    pub repaired: usize,
    pub stamp: ArtifactStamp,
}

/// Commit both artifacts under the exclusive lock.
///
/// Both files are staged before either is committed. Vectors are committed first; if the
/// fragment commit then fails, the previous vector blob is put back so the directory still
/// holds the old pair. A crash between the two commits leaves a pair that fails the
/// checksum check on load.
pub fn write_artifacts(
    paths: &ArtifactPaths,
    generation: u64,
    model_name: &str,
    vectors: &VecIndex,
    store: &FragmentStore,
) -> Result<ArtifactStamp> {
    if vectors.len() != store.len() {
        return Err(DociaError::InvalidIndex {
            reason: format!(
                "refusing to persist {} vectors with {} fragments",
                vectors.len(),
                store.len()
            ),
        });
    }

    fs_err::create_dir_all(&paths.dir)?;
    let _lock = IndexLock::exclusive(&paths.lock)?;

    let (blob, vectors_checksum) = encode_vectors(vectors)?;
    let record = FragmentsFileRef {
        format_version: FRAGMENTS_FORMAT_VERSION,
        generation,
        model_name,
        dimension: vectors.dimension() as u64,
        vector_count: vectors.len() as u64,
        vectors_checksum,
        fragments: store.records(),
    };
    let fragments_bytes = encode_to_vec(&record, artifact_config())?;

    let staged_vectors = stage_file(&paths.vectors, &blob)?;
    let staged_fragments = stage_file(&paths.fragments, &fragments_bytes)?;
    let previous_vectors = if paths.vectors.is_file() {
        Some(fs_err::read(&paths.vectors)?)
    } else {
        None
    };

    staged_vectors.commit()?;
    if let Err(err) = staged_fragments.commit() {
        restore_vectors(&paths.vectors, previous_vectors.as_deref());
        return Err(err.into());
    }

    log::info!(
        "docia: committed generation {generation} ({} fragments, {} + {} bytes) to {}",
        store.len(),
        blob.len(),
        fragments_bytes.len(),
        paths.dir.display()
    );
    Ok(paths.stamp())
}

/// Load both artifacts under the shared lock and check that they belong together.
pub fn read_artifacts(paths: &ArtifactPaths) -> Result<LoadedArtifacts> {
    if !paths.dir.is_dir() {
        return Err(DociaError::IndexNotInitialized {
            path: paths.dir.clone(),
        });
    }
    let _lock = IndexLock::shared(&paths.lock)?;
    if !paths.exist() {
        return Err(DociaError::IndexNotInitialized {
            path: paths.dir.clone(),
        });
    }

    let stamp = paths.stamp();
    let blob = fs_err::read(&paths.vectors)?;
    let (vectors, checksum) = decode_vectors(&blob)?;

    let raw = fs_err::read(&paths.fragments)?;
    let (file, _): (FragmentsFile, usize) = decode_from_slice(&raw, artifact_config())?;

    if file.format_version != FRAGMENTS_FORMAT_VERSION {
        return Err(DociaError::InvalidIndex {
            reason: format!("unsupported fragments format version {}", file.format_version),
        });
    }
    if file.vectors_checksum != checksum {
        return Err(DociaError::InvalidIndex {
            reason: "fragments.bin does not belong to fragments.vec (checksum mismatch)".into(),
        });
    }
    if file.vector_count != vectors.len() as u64 || file.fragments.len() != vectors.len() {
        return Err(DociaError::InvalidIndex {
            reason: format!(
                "artifact length mismatch: {} vectors, {} recorded, {} fragments",
                vectors.len(),
                file.vector_count,
                file.fragments.len()
            ),
        });
    }
    if file.dimension != vectors.dimension() as u64 {
        return Err(DociaError::InvalidIndex {
            reason: format!(
                "recorded dimension {} differs from vector blob dimension {}",
                file.dimension,
                vectors.dimension()
            ),
        });
    }

    let (store, repaired) = FragmentStore::from_records(file.fragments)?;
    if repaired > 0 {
        tracing::warn!(repaired, "recomputed stale normalized fragment text on load");
    }
    log::info!(
        "docia: loaded generation {} ({} fragments) from {}",
        file.generation,
        store.len(),
        paths.dir.display()
    );

    Ok(LoadedArtifacts {
        generation: file.generation,
        model_name: file.model_name,
        vectors,
        store,
        repaired,
        stamp,
    })
}

/// Write `bytes` to a temporary file beside `path`; nothing is visible until commit.
fn stage_file(path: &Path, bytes: &[u8]) -> Result<AtomicWriteFile> {
    let mut file = AtomicWriteFile::options().open(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

/// Undo a vector commit whose fragment partner failed to land.
fn restore_vectors(path: &Path, previous: Option<&[u8]>) {
    let restored = match previous {
        Some(bytes) => stage_file(path, bytes).and_then(|file| Ok(file.commit()?)),
        None => fs_err::remove_file(path).map_err(Into::into),
    };
    match restored {
        Ok(()) => tracing::warn!(
            path = %path.display(),
            "fragment commit failed; previous vector blob restored"
        ),
        Err(err) => tracing::error!(
            path = %path.display(),
            error = %err,
            "fragment commit failed and the previous vector blob could not be restored"
        ),
    }
}

fn encode_vectors(vectors: &VecIndex) -> Result<(Vec<u8>, [u8; 32])> {
    let dimension = u32::try_from(vectors.dimension()).map_err(|_| DociaError::InvalidIndex {
        reason: format!("dimension {} does not fit the vector format", vectors.dimension()),
    })?;
    let flat = vectors.as_flat();
    let mut blob = Vec::with_capacity(VECTORS_HEADER_SIZE + flat.len() * 4 + CHECKSUM_SIZE);
    blob.extend_from_slice(&VECTORS_MAGIC);
    blob.extend_from_slice(&VECTORS_FORMAT_VERSION.to_le_bytes());
    blob.extend_from_slice(&0u16.to_le_bytes());
    blob.extend_from_slice(&dimension.to_le_bytes());
    blob.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
    for value in flat {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    let checksum: [u8; 32] = blake3::hash(&blob).into();
    blob.extend_from_slice(&checksum);
    Ok((blob, checksum))
}

fn decode_vectors(blob: &[u8]) -> Result<(VecIndex, [u8; 32])> {
    let invalid = |reason: &str| DociaError::InvalidIndex {
        reason: format!("fragments.vec: {reason}"),
    };
    if blob.len() < VECTORS_HEADER_SIZE + CHECKSUM_SIZE {
        return Err(invalid("file truncated"));
    }
    if blob[..8] != VECTORS_MAGIC {
        return Err(invalid("bad magic"));
    }
    let version = u16::from_le_bytes([blob[8], blob[9]]);
    if version != VECTORS_FORMAT_VERSION {
        return Err(invalid(&format!("unsupported version {version}")));
    }
    let dimension = u32::from_le_bytes([blob[12], blob[13], blob[14], blob[15]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&blob[16..24]);
    let count = u64::from_le_bytes(count_bytes);

    let body_len = usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(dimension))
        .and_then(|floats| floats.checked_mul(4))
        .ok_or_else(|| invalid("vector count overflows"))?;
    if blob.len() != VECTORS_HEADER_SIZE + body_len + CHECKSUM_SIZE {
        return Err(invalid("length does not match header"));
    }

    let (payload, trailer) = blob.split_at(VECTORS_HEADER_SIZE + body_len);
    let actual: [u8; 32] = blake3::hash(payload).into();
    if actual[..] != trailer[..] {
        return Err(invalid("checksum mismatch"));
    }

    let data: Vec<f32> = payload[VECTORS_HEADER_SIZE..]
        .chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect();
    let vectors = VecIndex::from_flat(dimension, data)?;
    if vectors.len() as u64 != count {
        return Err(invalid("vector count does not match header"));
    }
    Ok((vectors, actual))
}
