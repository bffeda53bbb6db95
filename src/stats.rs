//! Per-speaker audio duration statistics.

use crate::audio;
use crate::error::Result;
use crate::project::Project;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Total clip duration per speaker, in milliseconds.
pub type SpeakerStats = BTreeMap<String, u64>;

/// Sum WAV durations per speaker folder. Prefers the curated `audio/`
/// layout; falls back to the per-split `speakers/` folders when nothing has
/// been copied yet.
pub fn speaker_stats(project: &Project) -> Result<SpeakerStats> {
    let mut stats = SpeakerStats::new();

    let audio_dir = project.audio_dir();
    if audio_dir.is_dir() && dir_has_subdirs(&audio_dir)? {
        accumulate_speaker_dirs(&audio_dir, &mut stats)?;
        return Ok(stats);
    }

    // Fallback: walk splits/*/..._segments/speakers/<id>/.
    let splits_dir = project.splits_dir();
    if splits_dir.is_dir() {
        for entry in fs::read_dir(&splits_dir)? {
            let file_dir = entry?.path();
            if !file_dir.is_dir() {
                continue;
            }
            for sub in fs::read_dir(&file_dir)? {
                let sub = sub?.path();
                let speakers = sub.join("speakers");
                if speakers.is_dir() {
                    accumulate_speaker_dirs(&speakers, &mut stats)?;
                }
            }
        }
    }
    Ok(stats)
}

fn dir_has_subdirs(dir: &Path) -> Result<bool> {
    for entry in fs::read_dir(dir)? {
        if entry?.path().is_dir() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn accumulate_speaker_dirs(root: &Path, stats: &mut SpeakerStats) -> Result<()> {
    for entry in fs::read_dir(root)? {
        let speaker_dir = entry?.path();
        if !speaker_dir.is_dir() {
            continue;
        }
        let speaker = speaker_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut total_ms = 0u64;
        for clip in fs::read_dir(&speaker_dir)? {
            let clip = clip?.path();
            if clip.extension().and_then(|e| e.to_str()) != Some("wav") {
                continue;
            }
            match audio::duration_ms(&clip) {
                Ok(ms) => total_ms += ms,
                Err(e) => warn!(clip = %clip.display(), error = %e, "unreadable clip"),
            }
        }
        *stats.entry(speaker).or_insert(0) += total_ms;
    }
    Ok(())
}

/// `HH:MM:SS` rendering of a millisecond total.
#[must_use]
pub fn format_duration(total_ms: u64) -> String {
    let total_seconds = total_ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Render the stats table the `stats` subcommand prints.
#[must_use]
pub fn render_table(stats: &SpeakerStats) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<16} {:>12} {:>14}\n",
        "speaker", "duration", "seconds"
    ));
    let mut total = 0u64;
    for (speaker, &ms) in stats {
        total += ms;
        out.push_str(&format!(
            "{:<16} {:>12} {:>14.2}\n",
            speaker,
            format_duration(ms),
            ms as f64 / 1000.0
        ));
    }
    out.push_str(&format!(
        "{:<16} {:>12} {:>14.2}\n",
        "total",
        format_duration(total),
        total as f64 / 1000.0
    ));
    out
}
