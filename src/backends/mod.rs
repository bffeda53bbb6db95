//! Seams for the ML black boxes the pipeline drives.
//!
//! Denoising, transcription, diarization, speaker embeddings and phonetic
//! alignment are external models. Each one sits behind a narrow trait so the
//! pipeline can be exercised with mocks; the shipped non-mock
//! implementations shell out to configurable commands.

pub mod command;
pub mod mock;

use crate::error::{Result, SpeechsetError};
use crate::fusion::tokens::TokenStream;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Diarization backend family. Each carries its own default cosine
/// similarity threshold for speaker assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiarizationKind {
    #[default]
    Pyannote,
    #[serde(rename = "wespeaker")]
    WeSpeaker,
    #[serde(rename = "3dspeaker")]
    ThreeDSpeaker,
}

impl DiarizationKind {
    #[must_use]
    pub fn default_similarity_threshold(self) -> f32 {
        match self {
            Self::Pyannote => 0.60,
            Self::WeSpeaker => 0.70,
            Self::ThreeDSpeaker => 0.50,
        }
    }

    /// Suffix used in per-split diarization artifact names.
    #[must_use]
    pub fn artifact_suffix(self) -> &'static str {
        match self {
            Self::Pyannote => "pyannote",
            Self::WeSpeaker => "wespeaker",
            Self::ThreeDSpeaker => "3dspeaker",
        }
    }
}

impl std::fmt::Display for DiarizationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.artifact_suffix())
    }
}

impl std::str::FromStr for DiarizationKind {
    type Err = SpeechsetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pyannote" => Ok(Self::Pyannote),
            "wespeaker" => Ok(Self::WeSpeaker),
            "3dspeaker" => Ok(Self::ThreeDSpeaker),
            other => Err(SpeechsetError::ConfigInvalidValue {
                key: "diarization_backend".to_string(),
                message: format!("unknown backend `{other}`"),
            }),
        }
    }
}

/// One who-spoke-when interval with a backend-local label.
#[derive(Debug, Clone, PartialEq)]
pub struct DiarizationTurn {
    pub speaker: String,
    pub start_s: f64,
    pub end_s: f64,
}

impl DiarizationTurn {
    #[must_use]
    pub fn start_ms(&self) -> u64 {
        (self.start_s * 1000.0).round() as u64
    }

    #[must_use]
    pub fn end_ms(&self) -> u64 {
        (self.end_s * 1000.0).round() as u64
    }
}

/// Serialize turns as the diarization CSV artifact: header `speaker,start,end`,
/// seconds as floats.
#[must_use]
pub fn turns_to_csv(turns: &[DiarizationTurn]) -> String {
    let mut out = String::from("speaker,start,end\n");
    for turn in turns {
        out.push_str(&format!(
            "{},{:.3},{:.3}\n",
            turn.speaker, turn.start_s, turn.end_s
        ));
    }
    out
}

/// Parse the diarization CSV artifact. A trailing `duration` column (written
/// by some backends) is tolerated and ignored. Intervals must be ordered by
/// start with `start < end`.
pub fn turns_from_csv(content: &str, origin: &Path) -> Result<Vec<DiarizationTurn>> {
    let mut lines = content.lines();
    let header = lines
        .next()
        .ok_or_else(|| SpeechsetError::consistency(origin, "empty diarization CSV"))?;
    if !header.trim_end().starts_with("speaker,start,end") {
        return Err(SpeechsetError::consistency(
            origin,
            format!("unexpected CSV header `{header}`"),
        ));
    }

    let mut turns = Vec::new();
    for (n, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 3 {
            return Err(SpeechsetError::consistency(
                origin,
                format!("line {}: expected at least 3 fields", n + 2),
            ));
        }
        let start_s: f64 = fields[1].trim().parse().map_err(|_| {
            SpeechsetError::consistency(origin, format!("line {}: bad start", n + 2))
        })?;
        let end_s: f64 = fields[2].trim().parse().map_err(|_| {
            SpeechsetError::consistency(origin, format!("line {}: bad end", n + 2))
        })?;
        if start_s >= end_s {
            return Err(SpeechsetError::consistency(
                origin,
                format!("line {}: start {start_s} >= end {end_s}", n + 2),
            ));
        }
        turns.push(DiarizationTurn {
            speaker: fields[0].trim().to_string(),
            start_s,
            end_s,
        });
    }

    for pair in turns.windows(2) {
        if pair[1].start_s < pair[0].start_s {
            return Err(SpeechsetError::consistency(origin, "turns out of order"));
        }
    }

    Ok(turns)
}

/// A phoneme interval from the phonetic aligner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phone {
    pub label: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Removes noise, echo and reverb from raw audio.
pub trait Denoiser: Send + Sync {
    fn denoise(&self, input: &Path, output: &Path) -> Result<()>;
    fn name(&self) -> &str;
}

/// Word-level speech-to-text with timestamps and confidences.
pub trait SpeechToText: Send + Sync {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<TokenStream>;
    fn name(&self) -> &str;
}

/// Who-spoke-when diarization with backend-local labels.
pub trait Diarizer: Send + Sync {
    fn diarize(&self, audio: &Path, max_speakers: Option<u32>) -> Result<Vec<DiarizationTurn>>;
    fn kind(&self) -> DiarizationKind;
}

/// Fixed-dimension speaker embedding over an audio window.
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, audio: &Path, start_ms: u64, end_ms: u64) -> Result<Vec<f32>>;
}

/// Phoneme-level forced alignment of a transcript against its clip.
pub trait PhoneticAligner: Send + Sync {
    fn align(&self, audio: &Path, text: &str, language: &str) -> Result<Vec<Phone>>;
}

/// The full set of backends a pipeline run needs.
#[derive(Clone)]
pub struct Backends {
    pub denoiser: Arc<dyn Denoiser>,
    pub asr: Arc<dyn SpeechToText>,
    pub diarizer: Arc<dyn Diarizer>,
    pub embedder: Arc<dyn EmbeddingExtractor>,
    pub aligner: Arc<dyn PhoneticAligner>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_kind_thresholds() {
        assert_eq!(DiarizationKind::Pyannote.default_similarity_threshold(), 0.60);
        assert_eq!(DiarizationKind::WeSpeaker.default_similarity_threshold(), 0.70);
        assert_eq!(
            DiarizationKind::ThreeDSpeaker.default_similarity_threshold(),
            0.50
        );
    }

    #[test]
    fn test_kind_parse_and_display() {
        assert_eq!("pyannote".parse::<DiarizationKind>().unwrap(), DiarizationKind::Pyannote);
        assert_eq!(
            "3dspeaker".parse::<DiarizationKind>().unwrap(),
            DiarizationKind::ThreeDSpeaker
        );
        assert!("unknown".parse::<DiarizationKind>().is_err());
        assert_eq!(DiarizationKind::WeSpeaker.to_string(), "wespeaker");
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&DiarizationKind::ThreeDSpeaker).unwrap();
        assert_eq!(json, "\"3dspeaker\"");
        let parsed: DiarizationKind = serde_json::from_str("\"wespeaker\"").unwrap();
        assert_eq!(parsed, DiarizationKind::WeSpeaker);
    }

    #[test]
    fn test_csv_roundtrip() {
        let turns = vec![
            DiarizationTurn {
                speaker: "SPEAKER_00".to_string(),
                start_s: 0.0,
                end_s: 1.25,
            },
            DiarizationTurn {
                speaker: "SPEAKER_01".to_string(),
                start_s: 1.25,
                end_s: 3.5,
            },
        ];
        let csv = turns_to_csv(&turns);
        assert!(csv.starts_with("speaker,start,end\n"));

        let parsed = turns_from_csv(&csv, &PathBuf::from("x.csv")).unwrap();
        assert_eq!(parsed, turns);
    }

    #[test]
    fn test_csv_tolerates_duration_column() {
        let csv = "speaker,start,end,duration\nSPEAKER_00,0.000,1.500,1.500\n";
        let parsed = turns_from_csv(csv, &PathBuf::from("x.csv")).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].end_s, 1.5);
    }

    #[test]
    fn test_csv_rejects_bad_header() {
        let err = turns_from_csv("a,b,c\n", &PathBuf::from("x.csv")).unwrap_err();
        assert!(matches!(err, SpeechsetError::Consistency { .. }));
    }

    #[test]
    fn test_csv_rejects_reversed_interval() {
        let csv = "speaker,start,end\nSPEAKER_00,2.0,1.0\n";
        assert!(turns_from_csv(csv, &PathBuf::from("x.csv")).is_err());
    }

    #[test]
    fn test_turn_ms_conversion() {
        let turn = DiarizationTurn {
            speaker: "L1".to_string(),
            start_s: 0.45,
            end_s: 0.951,
        };
        assert_eq!(turn.start_ms(), 450);
        assert_eq!(turn.end_ms(), 951);
    }
}
