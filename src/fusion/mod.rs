//! Segment fusion: silences + ASR tokens + diarization → speaker-attributed
//! segments with sub-segments, padding and confidence.

pub mod engine;
pub mod subsegments;
pub mod tokens;

pub use engine::fuse;

use crate::error::{Result, SpeechsetError};
use crate::settings::ProjectSettings;
use crate::store;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Good,
    Bad,
}

/// A time range with speaker attribution, text and silence padding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegRange {
    pub start_ms: u64,
    pub end_ms: u64,
    pub pad_start_ms: u64,
    pub pad_end_ms: u64,
    pub speaker_id: u32,
    pub text: String,
    pub min_confidence: f32,
}

impl SegRange {
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// True when the bodies `[start, end)` intersect.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start_ms < other.end_ms && other.start_ms < self.end_ms
    }
}

/// A fused utterance: one main range plus optional finer cuts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// 1-based index within the split.
    pub seg_idx: usize,
    pub main: SegRange,
    #[serde(default)]
    pub subs: Vec<SegRange>,
    pub status: SegmentStatus,
}

/// The `<split>_segments.json` / `<split>_segments_raw.json` artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentFile {
    pub segments: Vec<Segment>,
    pub audio_path: String,
    pub total_segments: usize,
}

impl SegmentFile {
    #[must_use]
    pub fn new(segments: Vec<Segment>, audio_path: &Path) -> Self {
        Self {
            total_segments: segments.len(),
            audio_path: audio_path.display().to_string(),
            segments,
        }
    }

    /// Load a segments artifact, enforcing range and ordering invariants.
    pub fn load(path: &Path) -> Result<Self> {
        let file: Self = store::read_json(path)?;
        for segment in &file.segments {
            if segment.main.start_ms >= segment.main.end_ms {
                return Err(SpeechsetError::consistency(
                    path,
                    format!(
                        "segment {} has start {} >= end {}",
                        segment.seg_idx, segment.main.start_ms, segment.main.end_ms
                    ),
                ));
            }
            for sub in &segment.subs {
                if sub.start_ms >= sub.end_ms {
                    return Err(SpeechsetError::consistency(
                        path,
                        format!("segment {} has an empty sub-segment", segment.seg_idx),
                    ));
                }
            }
        }
        for pair in file.segments.windows(2) {
            if pair[1].main.start_ms < pair[0].main.start_ms {
                return Err(SpeechsetError::consistency(path, "segments out of order"));
            }
        }
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        store::write_json_atomic(path, self)
    }

    /// Segments that survived fusion and (possibly) editing.
    pub fn good_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Good)
    }
}

/// Fusion knobs, extracted from project settings. The segment duration
/// bounds are fixed tunables rather than per-project settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionOptions {
    pub silence_pad_ms: u64,
    pub min_silence_length_ms: u64,
    pub build_subsegments: bool,
    pub join_subsegments: bool,
    pub max_sub_duration_ms: u64,
    pub min_segment_duration_ms: u64,
    pub max_segment_duration_ms: u64,
}

impl From<&ProjectSettings> for FusionOptions {
    fn from(settings: &ProjectSettings) -> Self {
        Self {
            silence_pad_ms: settings.silence_pad_ms,
            min_silence_length_ms: settings.min_silence_length_ms,
            build_subsegments: settings.build_subsegments,
            join_subsegments: settings.join_subsegments,
            max_sub_duration_ms: settings.max_sub_duration_ms,
            min_segment_duration_ms: crate::defaults::MIN_SEGMENT_DURATION_MS,
            max_segment_duration_ms: crate::defaults::MAX_SEGMENT_DURATION_MS,
        }
    }
}

/// Clip filename prefix encoding the segment's minimum token confidence.
#[must_use]
pub fn confidence_prefix(min_confidence: f32) -> &'static str {
    if min_confidence < 0.5 {
        "___"
    } else if min_confidence < 0.8 {
        "__"
    } else if min_confidence < 0.9 {
        "_"
    } else {
        ""
    }
}

/// Base filename (no extension) for a main segment clip.
#[must_use]
pub fn clip_basename(seg_idx: usize, min_confidence: f32) -> String {
    format!("clip{seg_idx:02}{}", confidence_prefix(min_confidence))
}

/// Base filename (no extension) for a sub-segment clip.
#[must_use]
pub fn sub_clip_basename(seg_idx: usize, sub_idx: usize, min_confidence: f32) -> String {
    format!(
        "clip{seg_idx:02}_{sub_idx:02}{}",
        confidence_prefix(min_confidence)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn range(start: u64, end: u64) -> SegRange {
        SegRange {
            start_ms: start,
            end_ms: end,
            pad_start_ms: 0,
            pad_end_ms: 0,
            speaker_id: 0,
            text: "text".to_string(),
            min_confidence: 1.0,
        }
    }

    #[test]
    fn test_overlap_predicate() {
        assert!(range(1000, 2000).overlaps(&range(1500, 2500)));
        assert!(range(1500, 2500).overlaps(&range(1000, 2000)));
        assert!(!range(0, 1000).overlaps(&range(1000, 2000)));
        assert!(!range(0, 500).overlaps(&range(600, 700)));
    }

    #[test]
    fn test_confidence_prefix_bands() {
        assert_eq!(confidence_prefix(0.4), "___");
        assert_eq!(confidence_prefix(0.5), "__");
        assert_eq!(confidence_prefix(0.79), "__");
        assert_eq!(confidence_prefix(0.8), "_");
        assert_eq!(confidence_prefix(0.9), "");
        assert_eq!(confidence_prefix(1.0), "");
    }

    #[test]
    fn test_clip_basenames() {
        assert_eq!(clip_basename(3, 0.95), "clip03");
        assert_eq!(clip_basename(3, 0.7), "clip03__");
        assert_eq!(sub_clip_basename(3, 1, 0.85), "clip03_01_");
        assert_eq!(sub_clip_basename(12, 4, 0.3), "clip12_04___");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SegmentStatus::Good).unwrap(),
            "\"good\""
        );
        assert_eq!(
            serde_json::to_string(&SegmentStatus::Bad).unwrap(),
            "\"bad\""
        );
    }

    #[test]
    fn test_segment_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s_segments.json");

        let file = SegmentFile::new(
            vec![Segment {
                seg_idx: 1,
                main: range(0, 900),
                subs: vec![range(0, 400), range(400, 900)],
                status: SegmentStatus::Good,
            }],
            Path::new("s.wav"),
        );
        file.save(&path).unwrap();

        let loaded = SegmentFile::load(&path).unwrap();
        assert_eq!(loaded, file);
        assert_eq!(loaded.total_segments, 1);
    }

    #[test]
    fn test_segment_file_root_key() {
        let file = SegmentFile::new(Vec::new(), Path::new("s.wav"));
        let json = serde_json::to_value(&file).unwrap();
        assert!(json.get("segments").is_some());
    }

    #[test]
    fn test_load_rejects_reversed_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s_segments.json");
        let mut file = SegmentFile::new(
            vec![Segment {
                seg_idx: 1,
                main: range(900, 900),
                subs: Vec::new(),
                status: SegmentStatus::Good,
            }],
            Path::new("s.wav"),
        );
        file.segments[0].main.end_ms = 100;
        file.save(&path).unwrap();

        assert!(matches!(
            SegmentFile::load(&path),
            Err(SpeechsetError::Consistency { .. })
        ));
    }

    #[test]
    fn test_load_rejects_unsorted_segments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s_segments.json");
        let file = SegmentFile::new(
            vec![
                Segment {
                    seg_idx: 1,
                    main: range(1000, 2000),
                    subs: Vec::new(),
                    status: SegmentStatus::Good,
                },
                Segment {
                    seg_idx: 2,
                    main: range(0, 500),
                    subs: Vec::new(),
                    status: SegmentStatus::Good,
                },
            ],
            Path::new("s.wav"),
        );
        file.save(&path).unwrap();

        assert!(SegmentFile::load(&path).is_err());
    }

    #[test]
    fn test_good_segments_filter() {
        let file = SegmentFile::new(
            vec![
                Segment {
                    seg_idx: 1,
                    main: range(0, 100),
                    subs: Vec::new(),
                    status: SegmentStatus::Good,
                },
                Segment {
                    seg_idx: 2,
                    main: range(200, 300),
                    subs: Vec::new(),
                    status: SegmentStatus::Bad,
                },
            ],
            Path::new("s.wav"),
        );
        assert_eq!(file.good_segments().count(), 1);
    }

    #[test]
    fn test_fusion_options_from_settings() {
        let settings = ProjectSettings::default();
        let options = FusionOptions::from(&settings);
        assert_eq!(options.silence_pad_ms, 50);
        assert_eq!(options.min_silence_length_ms, 500);
        assert!(options.build_subsegments);
        assert!(!options.join_subsegments);
        assert_eq!(options.max_sub_duration_ms, 15_000);
        assert_eq!(options.min_segment_duration_ms, 1_000);
        assert_eq!(options.max_segment_duration_ms, 25_000);
    }
}
