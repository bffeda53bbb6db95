//! Per-project settings model.
//!
//! Stored as `settings.json` in the project root. Missing fields fall back
//! to defaults so older projects keep loading after new options are added.

use crate::backends::DiarizationKind;
use crate::defaults;
use crate::error::{Result, SpeechsetError};
use crate::store;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectSettings {
    /// dBFS below which audio counts as silence.
    pub silence_threshold_db: f32,
    /// Minimum silence to count as a sentence boundary.
    pub min_silence_length_ms: u64,
    /// Max pad per side when snapping segments to silence.
    pub silence_pad_ms: u64,
    /// Upper bound for diarization backends that honor it (0 = unbounded).
    pub max_speakers: u32,
    /// ASR / phonetizer language (ISO code).
    pub language: String,
    /// Emit sub-segments inside each main segment.
    pub build_subsegments: bool,
    /// Merge short adjacent sub-segments.
    pub join_subsegments: bool,
    /// Bound for merged sub-segment duration.
    pub max_sub_duration_ms: u64,
    pub diarization_backend: DiarizationKind,
    /// Cosine similarity cutoff for speaker assignment; `None` uses the
    /// backend's own default.
    pub speaker_similarity_threshold: Option<f32>,
    /// Round-trip validation good/bad cutoff (0-100).
    pub validation_threshold: u8,
    /// Validation worker pool size.
    pub max_workers: usize,
    /// Per-project file-level parallelism.
    pub file_workers: usize,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            silence_threshold_db: defaults::SILENCE_THRESHOLD_DB,
            min_silence_length_ms: defaults::MIN_SILENCE_LENGTH_MS,
            silence_pad_ms: defaults::SILENCE_PAD_MS,
            max_speakers: 0,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            build_subsegments: true,
            join_subsegments: false,
            max_sub_duration_ms: defaults::MAX_SUB_DURATION_MS,
            diarization_backend: DiarizationKind::Pyannote,
            speaker_similarity_threshold: None,
            validation_threshold: defaults::VALIDATION_THRESHOLD,
            max_workers: defaults::MAX_WORKERS,
            file_workers: defaults::FILE_WORKERS,
        }
    }
}

impl ProjectSettings {
    /// Load settings from `settings.json`, or defaults when the file is
    /// missing. Invalid JSON is an error, not a silent fallback.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let settings: Self = store::read_json(path)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        store::write_json_atomic(path, self)
    }

    /// The effective speaker similarity threshold: the project override if
    /// set, otherwise the backend default.
    #[must_use]
    pub fn similarity_threshold(&self) -> f32 {
        self.speaker_similarity_threshold
            .unwrap_or_else(|| self.diarization_backend.default_similarity_threshold())
    }

    pub fn validate(&self) -> Result<()> {
        if self.validation_threshold > 100 {
            return Err(SpeechsetError::ConfigInvalidValue {
                key: "validation_threshold".to_string(),
                message: "must be between 0 and 100".to_string(),
            });
        }
        if self.max_workers == 0 {
            return Err(SpeechsetError::ConfigInvalidValue {
                key: "max_workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.file_workers == 0 {
            return Err(SpeechsetError::ConfigInvalidValue {
                key: "file_workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if let Some(t) = self.speaker_similarity_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(SpeechsetError::ConfigInvalidValue {
                    key: "speaker_similarity_threshold".to_string(),
                    message: "must be between 0.0 and 1.0".to_string(),
                });
            }
        }
        if self.min_silence_length_ms == 0 {
            return Err(SpeechsetError::ConfigInvalidValue {
                key: "min_silence_length_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
