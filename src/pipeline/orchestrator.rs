//! The per-file, per-split incremental pipeline executor.
//!
//! Each stage is an operator: it declares input and output artifacts, skips
//! itself when every output exists and is newer than every input, and is
//! forced by the override flags. Failures are isolated per file; the job
//! registry is updated continuously while stages run.

use crate::archive;
use crate::audio::{self, silence, SilenceMap};
use crate::backends::{turns_to_csv, Backends, DiarizationTurn};
use crate::defaults::{
    SILENCE_DETECT_MIN_MS, SPLIT_EXPANSION_SEC, SPLIT_MAX_SEC, SPLIT_MIN_CUT_SILENCE_MS,
    SPLIT_MIN_SEC, STATUS_PUBLISH_INTERVAL_MS,
};
use crate::error::{Result, SpeechsetError};
use crate::fusion::{
    self, clip_basename, sub_clip_basename, FusionOptions, SegmentFile,
};
use crate::fusion::tokens::TokenStream;
use crate::jobs::{JobKey, JobRegistry, JobState};
use crate::meta;
use crate::pipeline::stage::Stage;
use crate::pipeline::CancelToken;
use crate::progress::{Level, NullSink, ProgressSink};
use crate::project::{Project, SplitPaths};
use crate::speaker_db::SharedSpeakerDb;
use crate::store;
use crate::validation::ValidationEngine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Override and post-processing policy for a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Force every stage, ignoring cached outputs.
    pub override_all: bool,
    /// Force from the segment stage onward.
    pub force_segment: bool,
    /// Stop before the segment stage.
    pub skip_segment: bool,
    /// Run round-trip validation after all files.
    pub validate: bool,
    /// Remove per-file temporaries (cleaned audio) after the run.
    pub clean: bool,
    /// Copy good clips into `audio/speaker_<nn>/`.
    pub copy: bool,
    /// Generate `metadata.csv` and phonetic alignments.
    pub meta: bool,
    /// Delete clips of segments that fail validation.
    pub delete_bad: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub files: usize,
    pub succeeded: usize,
    /// `(file stem, error message)` for each failed file.
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    /// 0 on full success, 1 when any file failed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.failed.is_empty() {
            0
        } else {
            1
        }
    }
}

pub struct Orchestrator {
    project: Project,
    backends: Backends,
    options: RunOptions,
    speaker_db: SharedSpeakerDb,
    registry: JobRegistry,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(project: Project, backends: Backends, options: RunOptions) -> Result<Self> {
        let speaker_db = SharedSpeakerDb::open(&project.speaker_db_path())?;
        Ok(Self {
            project,
            backends,
            options,
            speaker_db,
            registry: JobRegistry::new(),
            sink: Arc::new(NullSink),
            cancel: CancelToken::new(),
        })
    }

    #[must_use]
    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Process every raw file, then the requested project-wide stages.
    pub fn run_project(&self) -> Result<RunSummary> {
        let files = self.project.raw_files()?;
        let mut summary = RunSummary {
            files: files.len(),
            ..RunSummary::default()
        };

        self.sink
            .begin(Level::Overall, "processing files", files.len() as u64);

        let file_workers = self.project.settings.file_workers;
        if file_workers <= 1 {
            for raw in &files {
                self.cancel.check()?;
                self.record_file_result(raw, self.process_file(raw), &mut summary);
                self.sink.advance(Level::Overall, 1);
            }
        } else {
            // Bounded fan-out. Speaker-id numbering becomes a permutation
            // of the single-threaded order, which the pipeline accepts.
            let (tx, rx) = crossbeam_channel::unbounded::<PathBuf>();
            for raw in &files {
                let _ = tx.send(raw.clone());
            }
            drop(tx);

            let results = std::sync::Mutex::new(Vec::new());
            std::thread::scope(|scope| {
                for _ in 0..file_workers.min(files.len().max(1)) {
                    let rx = rx.clone();
                    let results = &results;
                    scope.spawn(move || {
                        while let Ok(raw) = rx.recv() {
                            if self.cancel.is_cancelled() {
                                break;
                            }
                            let outcome = self.process_file(&raw);
                            self.sink.advance(Level::Overall, 1);
                            results.lock().unwrap().push((raw, outcome));
                        }
                    });
                }
            });
            self.cancel.check()?;
            for (raw, outcome) in results.into_inner().unwrap() {
                self.record_file_result(&raw, outcome, &mut summary);
            }
        }

        if self.options.validate {
            self.cancel.check()?;
            self.run_validation()?;
        }
        if self.options.meta {
            self.cancel.check()?;
            self.run_meta()?;
            self.run_align()?;
        }
        if self.options.copy {
            self.cancel.check()?;
            archive::copy_good_clips(&self.project)?;
        }
        if self.options.clean {
            archive::clean_temporaries(&self.project)?;
        }

        self.sink.finish();
        info!(
            files = summary.files,
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            "run finished"
        );
        Ok(summary)
    }

    fn record_file_result(
        &self,
        raw: &Path,
        outcome: Result<()>,
        summary: &mut RunSummary,
    ) {
        let stem = Project::file_stem(raw);
        match outcome {
            Ok(()) => summary.succeeded += 1,
            Err(e) => {
                warn!(file = %stem, error = %e, "file failed");
                summary.failed.push((stem, e.to_string()));
            }
        }
    }

    /// Run the full per-file pipeline for one raw file, bracketed by job
    /// registry bookkeeping.
    pub fn process_file(&self, raw: &Path) -> Result<()> {
        let stem = Project::file_stem(raw);
        let key = JobKey::new(self.project.name(), stem.as_str());
        self.registry.start(&key)?;

        let result = self.process_file_inner(raw, &stem, &key);
        match &result {
            Ok(()) => self.registry.finish(
                &key,
                JobState::Completed,
                "Processing completed successfully",
            ),
            Err(SpeechsetError::Cancelled) => {
                // Cooperative stop leaves partial artifacts and no failed
                // marker.
                self.registry.clear(&key);
            }
            Err(e) => self.registry.finish(&key, JobState::Failed, e.to_string()),
        }
        result
    }

    fn process_file_inner(&self, raw: &Path, stem: &str, key: &JobKey) -> Result<()> {
        self.sink.begin(Level::File, stem, 4);
        let stamps = Stamps::for_dir(&self.project.file_dir(stem));

        // Stage 1: denoise.
        self.cancel.check()?;
        let cleaned = self.project.cleaned_audio_path(stem);
        self.run_operator(
            key,
            &stamps,
            OperatorCall {
                stage: Stage::Denoise,
                progress: 5,
                force: self.options.override_all,
                split_id: stem,
                cache_key: Stage::Denoise.cache_key(stem, &self.backends.denoiser.name()),
                inputs: vec![raw.to_path_buf()],
                outputs: vec![cleaned.clone()],
            },
            || {
                self.backends
                    .denoiser
                    .denoise(raw, &cleaned)
                    .map_err(|e| stage_error(Stage::Denoise, e))
            },
        )?;
        self.sink.advance(Level::File, 1);

        // Stage 3: coarse split into shards.
        self.cancel.check()?;
        self.run_split(key, stem, &cleaned)?;
        self.sink.advance(Level::File, 1);

        let splits = self.project.list_splits(stem)?;
        self.sink
            .begin(Level::Split, "splits", splits.len() as u64);
        let total = splits.len().max(1) as u32;
        for (i, split) in splits.iter().enumerate() {
            self.cancel.check()?;
            // Per-split progress spans 20..90.
            let base = (20 + i as u32 * 70 / total).min(90) as u8;
            self.process_split(key, split, base)?;
            self.sink.advance(Level::Split, 1);
        }
        self.sink.advance(Level::File, 2);
        Ok(())
    }

    /// The per-split chain: silences, transcription, diarization, fusion.
    fn process_split(&self, key: &JobKey, split: &SplitPaths, progress: u8) -> Result<()> {
        let settings = &self.project.settings;
        let wav = split.wav();
        let stamps = Stamps::for_dir(split.dir());

        self.sink.begin(Level::Step, split.stem(), 4);

        // Silence detection.
        self.run_operator(
            key,
            &stamps,
            OperatorCall {
                stage: Stage::Silences,
                progress,
                force: self.options.override_all,
                split_id: split.stem(),
                cache_key: Stage::Silences.cache_key(
                    split.stem(),
                    &(settings.silence_threshold_db, SILENCE_DETECT_MIN_MS),
                ),
                inputs: vec![wav.clone()],
                outputs: vec![split.silences()],
            },
            || {
                let samples = audio::read_wav_mono(&wav)?;
                let map = silence::detect_silences(
                    &samples,
                    settings.silence_threshold_db,
                    SILENCE_DETECT_MIN_MS,
                );
                store::write_json_atomic(&split.silences(), &map)
            },
        )?;
        self.sink.advance(Level::Step, 1);

        // Transcription.
        self.cancel.check()?;
        self.run_operator(
            key,
            &stamps,
            OperatorCall {
                stage: Stage::Transcribe,
                progress: progress.saturating_add(2),
                force: self.options.override_all,
                split_id: split.stem(),
                cache_key: Stage::Transcribe.cache_key(split.stem(), &settings.language),
                inputs: vec![wav.clone()],
                outputs: vec![split.transcription()],
            },
            || {
                let stream = self
                    .backends
                    .asr
                    .transcribe(&wav, &settings.language)
                    .map_err(|e| stage_error(Stage::Transcribe, e))?;
                stream.save(&split.transcription())
            },
        )?;
        self.sink.advance(Level::Step, 1);

        // Diarization.
        self.cancel.check()?;
        let diarization_path = split.diarization(self.backends.diarizer.kind());
        self.run_operator(
            key,
            &stamps,
            OperatorCall {
                stage: Stage::Diarize,
                progress: progress.saturating_add(4),
                force: self.options.override_all,
                split_id: split.stem(),
                cache_key: Stage::Diarize.cache_key(
                    split.stem(),
                    &(
                        self.backends.diarizer.kind().artifact_suffix(),
                        settings.max_speakers,
                    ),
                ),
                inputs: vec![wav.clone()],
                outputs: vec![diarization_path.clone()],
            },
            || {
                let max_speakers = match settings.max_speakers {
                    0 => None,
                    n => Some(n),
                };
                let turns = self
                    .backends
                    .diarizer
                    .diarize(&wav, max_speakers)
                    .map_err(|e| stage_error(Stage::Diarize, e))?;
                store::write_atomic(&diarization_path, turns_to_csv(&turns).as_bytes())
            },
        )?;
        self.sink.advance(Level::Step, 1);

        // Fusion.
        self.cancel.check()?;
        if self.options.skip_segment {
            return Ok(());
        }
        let fusion_options = FusionOptions::from(settings);
        self.run_operator(
            key,
            &stamps,
            OperatorCall {
                stage: Stage::Segment,
                progress: progress.saturating_add(6),
                force: self.options.override_all || self.options.force_segment,
                split_id: split.stem(),
                cache_key: Stage::Segment.cache_key(
                    split.stem(),
                    &(&fusion_options, settings.similarity_threshold()),
                ),
                inputs: vec![
                    wav.clone(),
                    split.silences(),
                    split.transcription(),
                    diarization_path.clone(),
                ],
                outputs: vec![split.segments_raw(), split.segments()],
            },
            || self.run_segment_stage(split, &diarization_path),
        )?;
        self.sink.advance(Level::Step, 1);
        Ok(())
    }

    /// Fusion plus clip export for one split.
    fn run_segment_stage(&self, split: &SplitPaths, diarization_path: &Path) -> Result<()> {
        let settings = &self.project.settings;
        let wav = split.wav();

        let tokens = TokenStream::load(&split.transcription())?;
        let silences = SilenceMap::load(&split.silences())?;
        let csv = std::fs::read_to_string(diarization_path)?;
        let turns = crate::backends::turns_from_csv(&csv, diarization_path)?;

        let options = FusionOptions::from(settings);
        let threshold = settings.similarity_threshold();

        let segments = fusion::fuse(&tokens, &turns, &silences, &options, |label| {
            self.assign_label(&wav, &turns, label, threshold)
        });

        let file = SegmentFile::new(segments, &wav);
        // The raw snapshot freezes fusion output; the live file is what the
        // editor mutates afterwards.
        file.save(&split.segments_raw())?;
        file.save(&split.segments())?;

        self.export_clips(split, &file)?;
        Ok(())
    }

    /// Map one diarization label to a global speaker id: embed the label's
    /// first interval and assign against the project database. Failures
    /// downgrade to unknown instead of failing the split.
    fn assign_label(
        &self,
        wav: &Path,
        turns: &[DiarizationTurn],
        label: &str,
        threshold: f32,
    ) -> Option<u32> {
        let turn = turns.iter().find(|t| t.speaker == label)?;
        let embedding = match self
            .backends
            .embedder
            .extract(wav, turn.start_ms(), turn.end_ms())
        {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(label, error = %e, "embedding extraction failed, speaker unknown");
                return None;
            }
        };
        match self.speaker_db.assign(&embedding, threshold) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(label, error = %e, "speaker assignment failed, speaker unknown");
                None
            }
        }
    }

    /// Write per-speaker WAV + transcript clips for a split's segments.
    fn export_clips(&self, split: &SplitPaths, file: &SegmentFile) -> Result<()> {
        // Rebuild the clip tree from scratch so re-runs are byte-stable.
        let clips_root = split.segments_dir();
        if clips_root.exists() {
            std::fs::remove_dir_all(&clips_root)?;
        }

        let samples = audio::read_wav_mono(&split.wav())?;
        for segment in &file.segments {
            let dir = split.speaker_clip_dir(segment.main.speaker_id);
            let base = clip_basename(segment.seg_idx, segment.main.min_confidence);

            let clip = audio::clip_samples(
                &samples,
                segment.main.start_ms,
                segment.main.end_ms,
                segment.main.pad_start_ms,
                segment.main.pad_end_ms,
            );
            audio::write_wav_mono(&dir.join(format!("{base}.wav")), &clip)?;
            std::fs::write(
                dir.join(format!("{base}.txt")),
                format!("{}\n", segment.main.text),
            )?;

            // Sub clips only when the cut is real: more than one sub, and
            // never a duplicate of the main range.
            if segment.subs.len() > 1 {
                for (sub_idx, sub) in segment.subs.iter().enumerate() {
                    if sub.start_ms == segment.main.start_ms
                        && sub.end_ms == segment.main.end_ms
                    {
                        continue;
                    }
                    let sub_base =
                        sub_clip_basename(segment.seg_idx, sub_idx + 1, sub.min_confidence);
                    let sub_clip = audio::clip_samples(
                        &samples,
                        sub.start_ms,
                        sub.end_ms,
                        sub.pad_start_ms,
                        sub.pad_end_ms,
                    );
                    audio::write_wav_mono(&dir.join(format!("{sub_base}.wav")), &sub_clip)?;
                    std::fs::write(
                        dir.join(format!("{sub_base}.txt")),
                        format!("{}\n", sub.text),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Split the cleaned audio into shards, cutting at long silences.
    fn run_split(&self, key: &JobKey, stem: &str, cleaned: &Path) -> Result<()> {
        let existing = self.project.list_splits(stem)?;
        if !self.options.override_all && !existing.is_empty() {
            let outputs: Vec<PathBuf> = existing.iter().map(SplitPaths::wav).collect();
            if store::outputs_fresh(&[cleaned.to_path_buf()], &outputs) {
                info!(stage = %Stage::Split, file = stem, "already done");
                return Ok(());
            }
        }

        self.run_with_heartbeat(key, 10, "Splitting audio...", || {
            let samples = audio::read_wav_mono(cleaned)?;
            let duration_ms = samples.len() as u64 * 1000 / crate::defaults::SAMPLE_RATE as u64;
            let silences = silence::detect_silences(
                &samples,
                self.project.settings.silence_threshold_db,
                SPLIT_MIN_CUT_SILENCE_MS,
            );
            let cuts = choose_cut_points(duration_ms, &silences);

            for (index, &(start_ms, end_ms)) in cuts.iter().enumerate() {
                let split = self.project.split_paths(stem, index as u32 + 1);
                let shard = audio::clip_samples(&samples, start_ms, end_ms, 0, 0);
                audio::write_wav_mono(&split.wav(), &shard)
                    .map_err(|e| stage_error(Stage::Split, e))?;
            }
            info!(file = stem, shards = cuts.len(), "split complete");
            Ok(())
        })
    }

    /// Run an operator unless it is already done: every output exists, none
    /// is older than any input, and the recorded cache key still matches.
    /// A changed option (new cache key) invalidates just this operator and,
    /// through mtimes, its downstream stages.
    fn run_operator(
        &self,
        key: &JobKey,
        stamps: &Stamps,
        call: OperatorCall<'_>,
        run: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        let entry = format!("{}:{}", call.stage.name(), call.split_id);
        if !call.force
            && store::outputs_fresh(&call.inputs, &call.outputs)
            && stamps.matches(&entry, &call.cache_key)
        {
            info!(stage = %call.stage, split = call.split_id, "already done");
            return Ok(());
        }

        let message = format!("Running {}...", call.stage);
        self.run_with_heartbeat(key, call.progress, &message, || {
            run().map_err(|e| stage_error(call.stage, e))
        })?;
        stamps.record(&entry, &call.cache_key)
    }

    /// Publish status now and keep republishing every status interval until
    /// the operator returns, so the front-end sees liveness during long
    /// backend calls.
    fn run_with_heartbeat<T>(
        &self,
        key: &JobKey,
        progress: u8,
        message: &str,
        run: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        self.registry.update(key, progress, message);
        self.sink.log(message);

        let done = Arc::new(AtomicBool::new(false));
        let heartbeat = {
            let registry = self.registry.clone();
            let key = key.clone();
            let message = message.to_string();
            let done = done.clone();
            std::thread::spawn(move || {
                // Poll finely so joining after a short stage is cheap, but
                // republish on the status interval.
                let poll = Duration::from_millis(25);
                let republish_every = (STATUS_PUBLISH_INTERVAL_MS / 2).max(25) / 25;
                let mut ticks = 0u64;
                while !done.load(Ordering::SeqCst) {
                    std::thread::sleep(poll);
                    ticks += 1;
                    if ticks % republish_every == 0 && !done.load(Ordering::SeqCst) {
                        registry.update(&key, progress, message.as_str());
                    }
                }
            })
        };

        let result = run();
        done.store(true, Ordering::SeqCst);
        let _ = heartbeat.join();
        result
    }

    /// Round-trip validation over the whole project.
    pub fn run_validation(&self) -> Result<crate::validation::ValidationSummary> {
        let settings = &self.project.settings;
        let engine = ValidationEngine::new(
            self.backends.asr.clone(),
            &settings.language,
            settings.validation_threshold,
            settings.max_workers,
        )
        .with_cancel(self.cancel.clone())
        .with_sink(self.sink.clone())
        .with_delete_bad(self.options.delete_bad);
        engine.run(&self.project)
    }

    fn run_meta(&self) -> Result<()> {
        self.sink.log("Generating metadata...");
        let rows = meta::generate(&self.project).map_err(|e| stage_error(Stage::Meta, e))?;
        info!(rows, "metadata generated");
        Ok(())
    }

    /// Phonetic alignment for every good clip listed in the metadata.
    fn run_align(&self) -> Result<()> {
        let metadata_path = self.project.metadata_path();
        if !metadata_path.exists() {
            return Ok(());
        }
        let rows = meta::read_rows(&metadata_path)?;
        self.sink
            .begin(Level::Step, "aligning clips", rows.len() as u64);

        for row in rows {
            self.cancel.check()?;
            let clip = self.project.root().join(&row.audio_path);
            let phones_path = clip.with_extension("phones.json");
            if !self.options.override_all
                && store::outputs_fresh(&[clip.clone()], &[phones_path.clone()])
            {
                self.sink.advance(Level::Step, 1);
                continue;
            }
            if !clip.exists() {
                warn!(clip = %clip.display(), "clip missing, not aligned");
                self.sink.advance(Level::Step, 1);
                continue;
            }
            let phones = self
                .backends
                .aligner
                .align(&clip, &row.text, &self.project.settings.language)
                .map_err(|e| stage_error(Stage::Align, e))?;
            store::write_json_atomic(&phones_path, &phones)?;
            self.sink.advance(Level::Step, 1);
        }
        Ok(())
    }

    /// Materialize the final dataset under `output/`, tracked as the
    /// project's export job.
    pub fn export_project(&self) -> Result<usize> {
        let key = JobKey::export(self.project.name());
        self.registry.start(&key)?;

        let result = self.run_with_heartbeat(&key, 50, "Archiving dataset...", || {
            archive::archive_dataset(&self.project)
        });
        match &result {
            Ok(count) => self.registry.finish(
                &key,
                JobState::Completed,
                format!("Export completed: {count} clips"),
            ),
            Err(SpeechsetError::Cancelled) => self.registry.clear(&key),
            Err(e) => self
                .registry
                .finish(&key, JobState::Failed, e.to_string()),
        }
        result
    }

    #[must_use]
    pub fn project(&self) -> &Project {
        &self.project
    }
}

/// One operator invocation: identity, freshness inputs/outputs and the
/// cache key binding it to the options it ran with.
struct OperatorCall<'a> {
    stage: Stage,
    progress: u8,
    force: bool,
    split_id: &'a str,
    cache_key: String,
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
}

/// Recorded cache keys of completed operators, one JSON file per raw-file
/// directory.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct StageStamps {
    keys: std::collections::BTreeMap<String, String>,
}

struct Stamps {
    path: PathBuf,
}

impl Stamps {
    fn for_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(".stage_keys.json"),
        }
    }

    fn matches(&self, entry: &str, cache_key: &str) -> bool {
        if !self.path.exists() {
            return false;
        }
        store::read_json::<StageStamps>(&self.path)
            .map(|stamps| stamps.keys.get(entry).is_some_and(|k| k == cache_key))
            .unwrap_or(false)
    }

    fn record(&self, entry: &str, cache_key: &str) -> Result<()> {
        let mut stamps = if self.path.exists() {
            store::read_json::<StageStamps>(&self.path).unwrap_or_default()
        } else {
            StageStamps::default()
        };
        stamps
            .keys
            .insert(entry.to_string(), cache_key.to_string());
        store::write_json_atomic(&self.path, &stamps)
    }
}

/// Wrap a failure with the stage that produced it, keeping fatal classes
/// (config/environment/cancelled) intact for exit-code mapping.
fn stage_error(stage: Stage, e: SpeechsetError) -> SpeechsetError {
    if e.is_fatal() || matches!(e, SpeechsetError::Operator { .. }) {
        e
    } else {
        SpeechsetError::operator(stage.name(), e.to_string())
    }
}

/// Choose shard boundaries: shards of 55-60 minutes, cut at the longest
/// usable silence in the target window; the window widens once before a
/// hard cut is taken.
fn choose_cut_points(duration_ms: u64, silences: &SilenceMap) -> Vec<(u64, u64)> {
    let min_ms = SPLIT_MIN_SEC * 1000;
    let max_ms = SPLIT_MAX_SEC * 1000;
    let expansion_ms = SPLIT_EXPANSION_SEC * 1000;

    let mut cuts = Vec::new();
    let mut start = 0u64;

    while start < duration_ms {
        let remaining = duration_ms - start;
        if remaining <= max_ms {
            cuts.push((start, duration_ms));
            break;
        }

        let window_lo = start + min_ms;
        let window_hi = start + max_ms;
        let best = best_cut_silence(silences, window_lo, window_hi)
            .or_else(|| {
                best_cut_silence(silences, window_lo, (window_hi + expansion_ms).min(duration_ms))
            });

        let end = match best {
            Some((cut_start, _)) => cut_start.max(start + 1000),
            None => {
                warn!(start_ms = start, "no usable silence in window, hard cut");
                window_hi
            }
        };
        cuts.push((start, end));
        start = end;
    }
    cuts
}

/// The longest silence starting inside `[lo, hi]` that is long enough to
/// cut on.
fn best_cut_silence(silences: &SilenceMap, lo: u64, hi: u64) -> Option<(u64, u64)> {
    silences
        .spans()
        .iter()
        .filter(|&&(s, e)| s >= lo && s <= hi && e - s >= SPLIT_MIN_CUT_SILENCE_MS)
        .max_by_key(|&&(s, e)| e - s)
        .copied()
}
