//! Project workspace model and on-disk layout.
//!
//! ```text
//! projects/<name>/
//!   settings.json
//!   speaker_db.json
//!   bad_segments.json
//!   raw/<file>
//!   splits/<file-stem>/
//!     <stem>_cleaned_audio.wav
//!     <stem>_01.wav
//!     <stem>_01_silences.json
//!     <stem>_01_transcription.json
//!     <stem>_01_pyannote.csv
//!     <stem>_01_segments.json
//!     <stem>_01_segments_raw.json
//!     <stem>_01_segments/speakers/<gid>/clipNN.wav
//!   audio/speaker_<nn>/
//!   output/
//! ```
//!
//! Every per-split artifact name derives from the split's canonical stem.

use crate::backends::DiarizationKind;
use crate::error::{Result, SpeechsetError};
use crate::settings::ProjectSettings;
use std::fs;
use std::path::{Path, PathBuf};

pub const AUDIO_EXTENSIONS: [&str; 5] = ["mp3", "wav", "m4a", "flac", "ogg"];

#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    root: PathBuf,
    pub settings: ProjectSettings,
}

impl Project {
    /// Open an existing project under `projects_dir`.
    pub fn open(projects_dir: &Path, name: &str) -> Result<Self> {
        let root = projects_dir.join(name);
        if !root.is_dir() {
            return Err(SpeechsetError::ProjectNotFound {
                name: name.to_string(),
            });
        }
        let settings = ProjectSettings::load_or_default(&root.join("settings.json"))?;
        Ok(Self {
            name: name.to_string(),
            root,
            settings,
        })
    }

    /// Create a project skeleton (raw/, splits/, audio/) and open it.
    pub fn create(projects_dir: &Path, name: &str) -> Result<Self> {
        let root = projects_dir.join(name);
        for sub in ["raw", "splits", "audio"] {
            fs::create_dir_all(root.join(sub))?;
        }
        Self::open(projects_dir, name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    #[must_use]
    pub fn splits_dir(&self) -> PathBuf {
        self.root.join("splits")
    }

    #[must_use]
    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    #[must_use]
    pub fn speaker_db_path(&self) -> PathBuf {
        self.root.join("speaker_db.json")
    }

    #[must_use]
    pub fn bad_segments_path(&self) -> PathBuf {
        self.root.join("bad_segments.json")
    }

    #[must_use]
    pub fn validation_checkpoint_path(&self) -> PathBuf {
        self.root.join("validation_checkpoint.json")
    }

    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.splits_dir().join("metadata.csv")
    }

    /// Per-speaker clip directory under `audio/`.
    #[must_use]
    pub fn speaker_audio_dir(&self, speaker_id: u32) -> PathBuf {
        self.audio_dir().join(format!("speaker_{speaker_id:02}"))
    }

    /// Raw audio files, sorted by name.
    pub fn raw_files(&self) -> Result<Vec<PathBuf>> {
        let raw_dir = self.raw_dir();
        if !raw_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&raw_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| {
                        AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                    })
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Canonical file id: the raw file's stem, used for split directories
    /// and job keys.
    #[must_use]
    pub fn file_stem(raw_file: &Path) -> String {
        raw_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The per-file working directory under `splits/`.
    #[must_use]
    pub fn file_dir(&self, stem: &str) -> PathBuf {
        self.splits_dir().join(stem)
    }

    /// The cleaned (denoised) audio path for a raw file.
    #[must_use]
    pub fn cleaned_audio_path(&self, stem: &str) -> PathBuf {
        self.file_dir(stem).join(format!("{stem}_cleaned_audio.wav"))
    }

    /// Paths for a split by index (1-based, matching shard filenames).
    #[must_use]
    pub fn split_paths(&self, stem: &str, index: u32) -> SplitPaths {
        SplitPaths {
            dir: self.file_dir(stem),
            stem: format!("{stem}_{index:02}"),
        }
    }

    /// Discover existing splits of a file by scanning its directory for
    /// shard WAVs, sorted by index.
    pub fn list_splits(&self, stem: &str) -> Result<Vec<SplitPaths>> {
        let dir = self.file_dir(stem);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let prefix = format!("{stem}_");
        let mut stems: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let split_stem = name.strip_suffix(".wav")?.to_string();
                let suffix = split_stem.strip_prefix(&prefix)?;
                // Shards are `<stem>_NN.wav`; skip the cleaned audio and clips.
                if suffix.chars().all(|c| c.is_ascii_digit()) && !suffix.is_empty() {
                    Some(split_stem)
                } else {
                    None
                }
            })
            .collect();
        stems.sort();
        Ok(stems
            .into_iter()
            .map(|stem| SplitPaths {
                dir: dir.clone(),
                stem,
            })
            .collect())
    }
}

/// Canonical artifact locations for one split. Every stage's outputs derive
/// from the split stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPaths {
    dir: PathBuf,
    stem: String,
}

impl SplitPaths {
    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn wav(&self) -> PathBuf {
        self.dir.join(format!("{}.wav", self.stem))
    }

    #[must_use]
    pub fn silences(&self) -> PathBuf {
        self.dir.join(format!("{}_silences.json", self.stem))
    }

    #[must_use]
    pub fn transcription(&self) -> PathBuf {
        self.dir.join(format!("{}_transcription.json", self.stem))
    }

    #[must_use]
    pub fn diarization(&self, kind: DiarizationKind) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", self.stem, kind.artifact_suffix()))
    }

    /// The editable segments artifact.
    #[must_use]
    pub fn segments(&self) -> PathBuf {
        self.dir.join(format!("{}_segments.json", self.stem))
    }

    /// The pre-edit snapshot.
    #[must_use]
    pub fn segments_raw(&self) -> PathBuf {
        self.dir.join(format!("{}_segments_raw.json", self.stem))
    }

    /// Root of this split's exported clips.
    #[must_use]
    pub fn segments_dir(&self) -> PathBuf {
        self.dir.join(format!("{}_segments", self.stem))
    }

    /// Clip directory for one global speaker id.
    #[must_use]
    pub fn speaker_clip_dir(&self, speaker_id: u32) -> PathBuf {
        self.segments_dir()
            .join("speakers")
            .join(speaker_id.to_string())
    }
}
