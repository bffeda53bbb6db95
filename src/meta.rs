//! Dataset metadata: one `metadata.csv` row per good segment clip.
//!
//! Columns: `id,audio_path,speaker,text`. Paths are relative to the project
//! root so the file survives moving the project directory.

use crate::error::{Result, SpeechsetError};
use crate::fusion::{clip_basename, SegmentFile};
use crate::project::Project;
use crate::store;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub id: String,
    pub audio_path: String,
    pub speaker: String,
    pub text: String,
}

/// Quote a CSV field when it contains a separator, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split one CSV line into fields, honouring double-quoted fields.
fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' if field.is_empty() => quoted = true,
            ',' if !quoted => {
                fields.push(std::mem::take(&mut field));
            }
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

pub fn write_rows(path: &Path, rows: &[MetadataRow]) -> Result<()> {
    let mut out = String::from("id,audio_path,speaker,text\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{}\n",
            csv_field(&row.id),
            csv_field(&row.audio_path),
            csv_field(&row.speaker),
            csv_field(&row.text)
        ));
    }
    store::write_atomic(path, out.as_bytes())
}

pub fn read_rows(path: &Path) -> Result<Vec<MetadataRow>> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = content.lines();
    let header = lines
        .next()
        .ok_or_else(|| SpeechsetError::consistency(path, "empty metadata.csv"))?;
    if header.trim_end() != "id,audio_path,speaker,text" {
        return Err(SpeechsetError::consistency(
            path,
            format!("unexpected header `{header}`"),
        ));
    }

    let mut rows = Vec::new();
    for (n, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_line(line);
        if fields.len() != 4 {
            return Err(SpeechsetError::consistency(
                path,
                format!("line {}: expected 4 fields, got {}", n + 2, fields.len()),
            ));
        }
        let mut iter = fields.into_iter();
        rows.push(MetadataRow {
            id: iter.next().unwrap_or_default(),
            audio_path: iter.next().unwrap_or_default(),
            speaker: iter.next().unwrap_or_default(),
            text: iter.next().unwrap_or_default(),
        });
    }
    Ok(rows)
}

/// Build metadata rows for every good main segment clip in the project and
/// write `splits/metadata.csv`.
pub fn generate(project: &Project) -> Result<usize> {
    let mut rows = Vec::new();

    let splits_dir = project.splits_dir();
    if splits_dir.is_dir() {
        let mut stems: Vec<String> = std::fs::read_dir(&splits_dir)?
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
                    let basename =
                        clip_basename(segment.seg_idx, segment.main.min_confidence);
                    let clip = split
                        .speaker_clip_dir(segment.main.speaker_id)
                        .join(format!("{basename}.wav"));
                    let relative = clip
                        .strip_prefix(project.root())
                        .unwrap_or(&clip)
                        .display()
                        .to_string();
                    rows.push(MetadataRow {
                        id: format!("{}_{basename}", split.stem()),
                        audio_path: relative,
                        speaker: format!("speaker_{:02}", segment.main.speaker_id),
                        text: segment.main.text.clone(),
                    });
                }
            }
        }
    }

    write_rows(&project.metadata_path(), &rows)?;
    Ok(rows.len())
}
