//! RMS-based silence detection over PCM samples.
//!
//! Audio is scanned in fixed windows; a window whose RMS level falls below
//! the dBFS threshold is silent. Consecutive silent windows are coalesced
//! and runs shorter than the minimum length are discarded.

use crate::defaults::{SAMPLE_RATE, SILENCE_WINDOW_MS};
use crate::error::{Result, SpeechsetError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ordered, non-overlapping silence intervals in milliseconds.
///
/// Serializes as a bare JSON array of `[start_ms, end_ms]` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SilenceMap {
    spans: Vec<(u64, u64)>,
}

impl SilenceMap {
    /// Build from spans, verifying ordering invariants.
    pub fn new(spans: Vec<(u64, u64)>) -> Result<Self> {
        for (i, &(start, end)) in spans.iter().enumerate() {
            if start >= end {
                return Err(SpeechsetError::Other(format!(
                    "silence interval {i} has start {start} >= end {end}"
                )));
            }
            if i > 0 && spans[i - 1].1 > start {
                return Err(SpeechsetError::Other(format!(
                    "silence intervals {} and {i} overlap or are unsorted",
                    i - 1
                )));
            }
        }
        Ok(Self { spans })
    }

    /// Load from a `<split>_silences.json` artifact, enforcing invariants.
    pub fn load(path: &Path) -> Result<Self> {
        let spans: Vec<(u64, u64)> = crate::store::read_json(path)?;
        Self::new(spans).map_err(|e| SpeechsetError::consistency(path, e.to_string()))
    }

    #[must_use]
    pub fn spans(&self) -> &[(u64, u64)] {
        &self.spans
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// True when `[start, end]` lies entirely inside one silence interval.
    #[must_use]
    pub fn covers(&self, start: u64, end: u64) -> bool {
        self.spans.iter().any(|&(s, e)| s <= start && end <= e)
    }

    /// The last silence interval that ends at or before `t_ms`, or covers it.
    #[must_use]
    pub fn last_before(&self, t_ms: u64) -> Option<(u64, u64)> {
        self.spans
            .iter()
            .rev()
            .find(|&&(s, _)| s <= t_ms)
            .copied()
    }

    /// The first silence interval that starts at or after `t_ms`, or covers it.
    #[must_use]
    pub fn first_after(&self, t_ms: u64) -> Option<(u64, u64)> {
        self.spans.iter().find(|&&(_, e)| e >= t_ms).copied()
    }

    /// Silence intervals overlapping `[start, end]`, clipped to that range.
    #[must_use]
    pub fn overlapping(&self, start: u64, end: u64) -> Vec<(u64, u64)> {
        self.spans
            .iter()
            .filter(|&&(s, e)| s < end && e > start)
            .map(|&(s, e)| (s.max(start), e.min(end)))
            .collect()
    }

    /// The longest silence interval overlapping `[start, end]` (clipped).
    #[must_use]
    pub fn longest_in(&self, start: u64, end: u64) -> Option<(u64, u64)> {
        self.overlapping(start, end)
            .into_iter()
            .max_by_key(|&(s, e)| e - s)
    }
}

/// Detect silences in 16kHz mono samples.
///
/// `threshold_db` is a dBFS level (negative); `min_len_ms` is the shortest
/// run that gets reported.
#[must_use]
pub fn detect_silences(samples: &[i16], threshold_db: f32, min_len_ms: u64) -> SilenceMap {
    let window = (SILENCE_WINDOW_MS * SAMPLE_RATE as u64 / 1000) as usize;
    if window == 0 || samples.is_empty() {
        return SilenceMap::default();
    }

    let threshold_amp = 10f32.powf(threshold_db / 20.0) * i16::MAX as f32;

    let mut spans: Vec<(u64, u64)> = Vec::new();
    let mut run_start: Option<u64> = None;

    for (w, chunk) in samples.chunks(window).enumerate() {
        let sum_sq: f64 = chunk.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (sum_sq / chunk.len() as f64).sqrt() as f32;
        let t_ms = w as u64 * SILENCE_WINDOW_MS;

        if rms <= threshold_amp {
            if run_start.is_none() {
                run_start = Some(t_ms);
            }
        } else if let Some(start) = run_start.take() {
            if t_ms - start >= min_len_ms {
                spans.push((start, t_ms));
            }
        }
    }

    if let Some(start) = run_start {
        let end_ms = samples.len() as u64 * 1000 / SAMPLE_RATE as u64;
        if end_ms > start && end_ms - start >= min_len_ms {
            spans.push((start, end_ms));
        }
    }

    SilenceMap { spans }
}
