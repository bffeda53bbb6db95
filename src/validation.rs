//! Round-trip validation: re-transcribe every good segment clip and compare
//! against the stored text with a fuzzy threshold.
//!
//! A worker pool processes segments concurrently. Shared state (outcome
//! list, processed set, progress counter) sits behind independent locks; no
//! lock is held across the ASR call. The processed set is checkpointed
//! every batch so an interrupted run resumes where it stopped and converges
//! on the same final bad-list.

use crate::backends::SpeechToText;
use crate::defaults::CHECKPOINT_INTERVAL;
use crate::error::{Result, SpeechsetError};
use crate::fusion::tokens::detokenize;
use crate::fusion::{clip_basename, SegmentFile, SegmentStatus};
use crate::pipeline::CancelToken;
use crate::progress::{Level, NullSink, ProgressSink};
use crate::project::Project;
use crate::store;
use crate::text;
use crossbeam_channel::unbounded;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Good,
    Bad,
    ValidationError,
}

/// Per-segment validation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub split: String,
    pub seg_idx: usize,
    pub clip: String,
    pub segments_file: String,
    pub expected_text: String,
    pub observed_text: String,
    /// 0-100 fuzzy similarity.
    pub similarity: u8,
    pub verdict: Verdict,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Checkpoint {
    processed: BTreeSet<String>,
    outcomes: Vec<ValidationOutcome>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationSummary {
    pub total: usize,
    pub checked: usize,
    pub skipped: usize,
    pub bad: usize,
    pub errors: usize,
}

#[derive(Debug, Clone)]
struct Item {
    id: String,
    split: String,
    seg_idx: usize,
    clip: PathBuf,
    segments_file: PathBuf,
    expected_text: String,
}

pub struct ValidationEngine {
    asr: Arc<dyn SpeechToText>,
    language: String,
    threshold: u8,
    max_workers: usize,
    delete_bad: bool,
    cancel: CancelToken,
    sink: Arc<dyn ProgressSink>,
}

impl ValidationEngine {
    #[must_use]
    pub fn new(asr: Arc<dyn SpeechToText>, language: &str, threshold: u8, max_workers: usize) -> Self {
        Self {
            asr,
            language: language.to_string(),
            threshold,
            max_workers: max_workers.max(1),
            delete_bad: false,
            cancel: CancelToken::new(),
            sink: Arc::new(NullSink),
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Remove the clip and its transcript file when a segment turns bad.
    #[must_use]
    pub fn with_delete_bad(mut self, delete_bad: bool) -> Self {
        self.delete_bad = delete_bad;
        self
    }

    /// Validate every good segment clip in the project.
    pub fn run(&self, project: &Project) -> Result<ValidationSummary> {
        let items = collect_items(project)?;
        let checkpoint_path = project.validation_checkpoint_path();

        let checkpoint = if checkpoint_path.exists() {
            store::read_json::<Checkpoint>(&checkpoint_path)?
        } else {
            Checkpoint::default()
        };

        let processed = Arc::new(Mutex::new(checkpoint.processed));
        let outcomes = Arc::new(Mutex::new(checkpoint.outcomes));
        let counter = AtomicUsize::new(0);

        let remaining: Vec<Item> = {
            let done = processed.lock().unwrap();
            items
                .iter()
                .filter(|item| !done.contains(&item.id))
                .cloned()
                .collect()
        };
        let skipped = items.len() - remaining.len();
        if skipped > 0 {
            info!(skipped, "resuming validation from checkpoint");
        }

        self.sink
            .begin(Level::Step, "validating segments", remaining.len() as u64);

        let (tx, rx) = unbounded::<Item>();
        for item in remaining {
            let _ = tx.send(item);
        }
        drop(tx);

        std::thread::scope(|scope| {
            for _ in 0..self.max_workers {
                let rx = rx.clone();
                let processed = processed.clone();
                let outcomes = outcomes.clone();
                let counter = &counter;
                let checkpoint_path = checkpoint_path.as_path();
                scope.spawn(move || {
                    while let Ok(item) = rx.recv() {
                        // Cooperative cancel between segments.
                        if self.cancel.is_cancelled() {
                            break;
                        }

                        // The ASR call runs without any lock held.
                        let outcome = self.validate_item(&item);

                        outcomes.lock().unwrap().push(outcome);
                        processed.lock().unwrap().insert(item.id.clone());
                        self.sink.advance(Level::Step, 1);

                        let done = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        if done % CHECKPOINT_INTERVAL == 0 {
                            flush_checkpoint(checkpoint_path, &processed, &outcomes);
                        }
                    }
                });
            }
        });

        if self.cancel.is_cancelled() {
            flush_checkpoint(&checkpoint_path, &processed, &outcomes);
            return Err(SpeechsetError::Cancelled);
        }

        let outcomes = Arc::try_unwrap(outcomes)
            .map(|m| m.into_inner().unwrap())
            .unwrap_or_else(|arc| arc.lock().unwrap().clone());

        let summary = self.apply_outcomes(project, &outcomes)?;

        // The run completed; the checkpoint has served its purpose.
        if checkpoint_path.exists() {
            let _ = std::fs::remove_file(&checkpoint_path);
        }

        Ok(ValidationSummary {
            total: items.len(),
            checked: counter.load(Ordering::SeqCst),
            skipped,
            ..summary
        })
    }

    fn validate_item(&self, item: &Item) -> ValidationOutcome {
        let base = ValidationOutcome {
            split: item.split.clone(),
            seg_idx: item.seg_idx,
            clip: item.clip.display().to_string(),
            segments_file: item.segments_file.display().to_string(),
            expected_text: item.expected_text.clone(),
            observed_text: String::new(),
            similarity: 0,
            verdict: Verdict::ValidationError,
        };

        match self.asr.transcribe(&item.clip, &self.language) {
            Ok(stream) => {
                let token_refs: Vec<_> = stream.tokens.iter().collect();
                let observed = detokenize(&token_refs);
                let similarity = text::similarity(&item.expected_text, &observed);
                let verdict = if similarity >= self.threshold {
                    Verdict::Good
                } else {
                    Verdict::Bad
                };
                ValidationOutcome {
                    observed_text: observed,
                    similarity,
                    verdict,
                    ..base
                }
            }
            Err(e) => {
                // A worker failure poisons only its own segment.
                warn!(clip = %item.clip.display(), error = %e, "validation worker error");
                base
            }
        }
    }

    /// Persist verdicts: mark bad segments in their segments artifact and
    /// append them to the project's bad-segments log.
    fn apply_outcomes(
        &self,
        project: &Project,
        outcomes: &[ValidationOutcome],
    ) -> Result<ValidationSummary> {
        let bad: Vec<&ValidationOutcome> = outcomes
            .iter()
            .filter(|o| o.verdict == Verdict::Bad)
            .collect();
        let errors = outcomes
            .iter()
            .filter(|o| o.verdict == Verdict::ValidationError)
            .count();

        // Group status flips per artifact so each file is rewritten once.
        let mut by_file: BTreeMap<&str, Vec<&ValidationOutcome>> = BTreeMap::new();
        for outcome in &bad {
            by_file
                .entry(outcome.segments_file.as_str())
                .or_default()
                .push(outcome);
        }
        for (segments_file, file_outcomes) in by_file {
            let path = Path::new(segments_file);
            let mut file = SegmentFile::load(path)?;
            for outcome in &file_outcomes {
                if let Some(segment) = file
                    .segments
                    .iter_mut()
                    .find(|s| s.seg_idx == outcome.seg_idx)
                {
                    segment.status = SegmentStatus::Bad;
                }
            }
            file.save(path)?;
        }

        if !bad.is_empty() {
            let bad_path = project.bad_segments_path();
            let mut log: Vec<ValidationOutcome> = if bad_path.exists() {
                store::read_json(&bad_path)?
            } else {
                Vec::new()
            };
            log.extend(bad.iter().map(|&o| o.clone()));
            store::write_json_atomic(&bad_path, &log)?;
        }

        if self.delete_bad {
            for outcome in &bad {
                let clip = PathBuf::from(&outcome.clip);
                let _ = std::fs::remove_file(clip.with_extension("txt"));
                let _ = std::fs::remove_file(&clip);
            }
        }

        Ok(ValidationSummary {
            bad: bad.len(),
            errors,
            ..ValidationSummary::default()
        })
    }
}

fn flush_checkpoint(
    path: &Path,
    processed: &Mutex<BTreeSet<String>>,
    outcomes: &Mutex<Vec<ValidationOutcome>>,
) {
    let checkpoint = Checkpoint {
        processed: processed.lock().unwrap().clone(),
        outcomes: outcomes.lock().unwrap().clone(),
    };
    if let Err(e) = store::write_json_atomic(path, &checkpoint) {
        warn!(error = %e, "failed to flush validation checkpoint");
    }
}

/// Every good main segment clip in the project, in stable order.
fn collect_items(project: &Project) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let splits_dir = project.splits_dir();
    if !splits_dir.is_dir() {
        return Ok(items);
    }

    let mut stems: Vec<String> = std::fs::read_dir(&splits_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    stems.sort();

    for stem in stems {
        for split in project.list_splits(&stem)? {
            let segments_file = split.segments();
            if !segments_file.exists() {
                continue;
            }
            let file = SegmentFile::load(&segments_file)?;
            for segment in file.good_segments() {
                let basename = clip_basename(segment.seg_idx, segment.main.min_confidence);
                let clip = split
                    .speaker_clip_dir(segment.main.speaker_id)
                    .join(format!("{basename}.wav"));
                items.push(Item {
                    id: format!("{}/{basename}", split.stem()),
                    split: split.stem().to_string(),
                    seg_idx: segment.seg_idx,
                    clip,
                    segments_file: segments_file.clone(),
                    expected_text: segment.main.text.clone(),
                });
            }
        }
    }
    Ok(items)
}
