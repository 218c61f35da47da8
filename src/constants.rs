//! Fixed values shared across the retrieval core.

/// Score assigned to fragments containing the whole normalized query.
pub const EXACT_PHRASE_SCORE: f32 = 5.0;
/// Score assigned to fragments containing any normalized query word.
pub const KEYWORD_SCORE: f32 = 2.0;
/// Additive boost (or initial score) for fragments sharing a domain pattern with the query.
pub const PATTERN_BOOST_SCORE: f32 = 3.0;
/// Keyword fallback only runs while fewer candidates than this have accumulated.
pub const KEYWORD_FALLBACK_MIN_CANDIDATES: usize = 3;
/// Exact-phrase stage requires at least this many whitespace-separated query words.
pub const EXACT_PHRASE_MIN_WORDS: usize = 2;

/// Text of the synthetic candidate returned when nothing matched.
pub const NO_INFORMATION_TEXT: &str = "no information found";

pub const DEFAULT_TOP_K: usize = 20;
pub const DEFAULT_HIGH_THRESHOLD: f32 = 0.70;
pub const DEFAULT_LOW_THRESHOLD: f32 = 0.45;

pub const DEFAULT_MAX_FRAGMENT_CHARS: usize = 1200;
pub const DEFAULT_SECTION_MARKER: &str = r"Artículo\s+\d+";
pub const DEFAULT_NORMATIVE_KINDS: &[&str] = &["código", "ley", "norma"];
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

/// Artifact holding the vector blob.
pub const VECTORS_FILE_NAME: &str = "fragments.vec";
/// Artifact holding the positional fragment array.
pub const FRAGMENTS_FILE_NAME: &str = "fragments.bin";
/// Advisory lock file guarding the artifact pair across processes.
pub const LOCK_FILE_NAME: &str = "docia.lock";

pub const VECTORS_MAGIC: [u8; 8] = *b"DOCIAVEC";
pub const VECTORS_FORMAT_VERSION: u16 = 1;
pub const FRAGMENTS_FORMAT_VERSION: u16 = 1;

/// Tolerance when checking stored vectors for unit length.
pub const UNIT_NORM_EPSILON: f32 = 1e-3;
