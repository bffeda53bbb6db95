//! Default constants shared across configuration types and pipeline stages.

/// Sample rate all cleaned audio and exported clips are resampled to.
pub const SAMPLE_RATE: u32 = 16_000;

/// Silence threshold in dBFS; frames quieter than this count as silence.
pub const SILENCE_THRESHOLD_DB: f32 = -40.0;

/// Minimum silence run length that counts as a sentence boundary.
pub const MIN_SILENCE_LENGTH_MS: u64 = 500;

/// Maximum padding per side when snapping segment edges to silence.
pub const SILENCE_PAD_MS: u64 = 50;

/// Default ASR / phonetizer language (ISO 639-1).
pub const DEFAULT_LANGUAGE: &str = "sl";

/// Segments with minimum token confidence below this start out bad.
pub const MIN_GOOD_CONFIDENCE: f32 = 0.60;

/// Round-trip validation similarity cutoff (0-100).
pub const VALIDATION_THRESHOLD: u8 = 85;

/// Validation worker pool size.
pub const MAX_WORKERS: usize = 4;

/// Per-project file-level parallelism. Stages are heavy, so one at a time.
pub const FILE_WORKERS: usize = 1;

/// Adjacent sub-segments are merged while their combined duration stays
/// below this bound (when `join_subsegments` is enabled).
pub const MAX_SUB_DURATION_MS: u64 = 15_000;

/// Main segment duration bounds. A run of tokens with no speaker, silence
/// or punctuation boundary is subdivided so no training clip exceeds the
/// upper bound; cuts below the lower bound are avoided when possible.
pub const MIN_SEGMENT_DURATION_MS: u64 = 1_000;
pub const MAX_SEGMENT_DURATION_MS: u64 = 25_000;

/// Coarse splitter: target shard length window, in seconds.
pub const SPLIT_MIN_SEC: u64 = 55 * 60;
pub const SPLIT_MAX_SEC: u64 = 60 * 60;

/// Coarse splitter: widen the cut window by this much when no usable
/// silence falls inside the target window.
pub const SPLIT_EXPANSION_SEC: u64 = 5 * 60;

/// Coarse splitter: a silence must be at least this long to cut on.
pub const SPLIT_MIN_CUT_SILENCE_MS: u64 = 100;

/// Analysis window for RMS-based silence detection.
pub const SILENCE_WINDOW_MS: u64 = 10;

/// Detector floor for the per-split silence artifact. Finer than the
/// fusion boundary threshold so padding and sub-segment cuts can see short
/// silences.
pub const SILENCE_DETECT_MIN_MS: u64 = 100;

/// Validation checkpoint flush interval, in completed segments.
pub const CHECKPOINT_INTERVAL: usize = 50;

/// How often the orchestrator must publish job status during a stage.
pub const STATUS_PUBLISH_INTERVAL_MS: u64 = 2_000;
