//! Dataset materialization: curated per-speaker clip folders and the final
//! `output/` layout. Packaging the output directory into a tarball or zip
//! is left to external tooling.

use crate::error::{Result, SpeechsetError};
use crate::fusion::{clip_basename, SegmentFile};
use crate::meta::{self, MetadataRow};
use crate::project::Project;
use std::fs;
use tracing::{info, warn};

/// Copy every good segment clip (and its transcript) into
/// `audio/speaker_<nn>/`, named `<split>_<clip>.wav` to stay unique across
/// splits.
pub fn copy_good_clips(project: &Project) -> Result<usize> {
    let mut copied = 0;

    let splits_dir = project.splits_dir();
    if !splits_dir.is_dir() {
        return Ok(0);
    }
    let mut stems: Vec<String> = fs::read_dir(&splits_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    stems.sort();

    for stem in stems {
        for split in project.list_splits(&stem)? {
            let segments_path = split.segments();
            if !segments_path.exists() {
                continue;
            }
            let file = SegmentFile::load(&segments_path)?;
            for segment in file.good_segments() {
                let basename = clip_basename(segment.seg_idx, segment.main.min_confidence);
                let clip = split
                    .speaker_clip_dir(segment.main.speaker_id)
                    .join(format!("{basename}.wav"));
                if !clip.exists() {
                    warn!(clip = %clip.display(), "clip missing, not copied");
                    continue;
                }

                let speaker_dir = project.speaker_audio_dir(segment.main.speaker_id);
                fs::create_dir_all(&speaker_dir)?;
                let target_base = format!("{}_{basename}", split.stem());
                fs::copy(&clip, speaker_dir.join(format!("{target_base}.wav")))?;
                fs::write(
                    speaker_dir.join(format!("{target_base}.txt")),
                    format!("{}\n", segment.main.text),
                )?;
                copied += 1;
            }
        }
    }

    info!(copied, "materialized good clips");
    Ok(copied)
}

/// Build the final dataset under `output/`: one folder per speaker with
/// `<id>.wav` + `<id>.txt` pairs and a rewritten `metadata.csv` whose paths
/// are relative to `output/`.
pub fn archive_dataset(project: &Project) -> Result<usize> {
    let metadata_path = project.metadata_path();
    if !metadata_path.exists() {
        return Err(SpeechsetError::Other(format!(
            "metadata.csv not found at {}; run the meta stage first",
            metadata_path.display()
        )));
    }

    let rows = meta::read_rows(&metadata_path)?;
    let output_dir = project.output_dir();
    fs::create_dir_all(&output_dir)?;

    let mut archived = Vec::new();
    for row in rows {
        let source = project.root().join(&row.audio_path);
        if !source.exists() {
            warn!(audio = %source.display(), "audio file missing, skipped");
            continue;
        }

        let speaker_dir = output_dir.join(&row.speaker);
        fs::create_dir_all(&speaker_dir)?;
        fs::copy(&source, speaker_dir.join(format!("{}.wav", row.id)))?;
        fs::write(
            speaker_dir.join(format!("{}.txt", row.id)),
            format!("{}\n", row.text),
        )?;

        archived.push(MetadataRow {
            audio_path: format!("{}/{}.wav", row.speaker, row.id),
            ..row
        });
    }

    meta::write_rows(&output_dir.join("metadata.csv"), &archived)?;
    info!(clips = archived.len(), "dataset archived");
    Ok(archived.len())
}

/// Post-run cleanup: drop the per-file cleaned audio, which is large and
/// fully derivable from the raw file.
pub fn clean_temporaries(project: &Project) -> Result<usize> {
    let mut removed = 0;
    let splits_dir = project.splits_dir();
    if !splits_dir.is_dir() {
        return Ok(0);
    }
    for entry in fs::read_dir(&splits_dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let stem = entry.file_name().to_string_lossy().into_owned();
        let cleaned = project.cleaned_audio_path(&stem);
        if cleaned.exists() {
            fs::remove_file(&cleaned)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{SegRange, Segment, SegmentStatus};
    use tempfile::TempDir;

    fn make_segment(seg_idx: usize, speaker_id: u32, status: SegmentStatus) -> Segment {
        Segment {
            seg_idx,
            main: SegRange {
                start_ms: seg_idx as u64 * 1000,
                end_ms: seg_idx as u64 * 1000 + 900,
                pad_start_ms: 0,
                pad_end_ms: 0,
                speaker_id,
                text: format!("besedilo {seg_idx}"),
                min_confidence: 0.95,
            },
            subs: Vec::new(),
            status,
        }
    }

    fn seeded_project(dir: &TempDir) -> Project {
        let project = Project::create(dir.path(), "show").unwrap();
        let split = project.split_paths("ep01", 1);
        crate::audio::write_wav_mono(&split.wav(), &vec![100i16; 1600]).unwrap();

        let segments = vec![
            make_segment(1, 0, SegmentStatus::Good),
            make_segment(2, 1, SegmentStatus::Bad),
        ];
        for seg in &segments {
            let basename = clip_basename(seg.seg_idx, seg.main.min_confidence);
            let clip = split
                .speaker_clip_dir(seg.main.speaker_id)
                .join(format!("{basename}.wav"));
            crate::audio::write_wav_mono(&clip, &vec![100i16; 800]).unwrap();
        }
        SegmentFile::new(segments, &split.wav())
            .save(&split.segments())
            .unwrap();
        project
    }

    #[test]
    fn test_copy_good_clips_skips_bad() {
        let dir = TempDir::new().unwrap();
        let project = seeded_project(&dir);

        let copied = copy_good_clips(&project).unwrap();
        assert_eq!(copied, 1);

        let good = project.speaker_audio_dir(0).join("ep01_01_clip01.wav");
        assert!(good.exists());
        assert!(good.with_extension("txt").exists());
        assert!(!project.speaker_audio_dir(1).exists());
    }

    #[test]
    fn test_archive_requires_metadata() {
        let dir = TempDir::new().unwrap();
        let project = Project::create(dir.path(), "show").unwrap();
        assert!(archive_dataset(&project).is_err());
    }

    #[test]
    fn test_archive_builds_output_layout() {
        let dir = TempDir::new().unwrap();
        let project = seeded_project(&dir);
        crate::meta::generate(&project).unwrap();

        let archived = archive_dataset(&project).unwrap();
        assert_eq!(archived, 1);

        let wav = project
            .output_dir()
            .join("speaker_00")
            .join("ep01_01_clip01.wav");
        assert!(wav.exists());
        assert!(wav.with_extension("txt").exists());

        let rows = meta::read_rows(&project.output_dir().join("metadata.csv")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].audio_path, "speaker_00/ep01_01_clip01.wav");
    }

    #[test]
    fn test_clean_temporaries_removes_cleaned_audio() {
        let dir = TempDir::new().unwrap();
        let project = seeded_project(&dir);
        let cleaned = project.cleaned_audio_path("ep01");
        crate::audio::write_wav_mono(&cleaned, &vec![0i16; 1600]).unwrap();

        let removed = clean_temporaries(&project).unwrap();
        assert_eq!(removed, 1);
        assert!(!cleaned.exists());
        // Shards stay.
        assert!(project.split_paths("ep01", 1).wav().exists());
    }
}
