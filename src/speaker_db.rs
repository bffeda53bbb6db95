//! Persistent speaker identity database.
//!
//! Maps dense global speaker ids (0, 1, 2, ...) to lists of unit-normalized
//! embeddings. Assignment is cosine nearest-neighbour against every stored
//! embedding under a configurable threshold. One JSON blob per project.

use crate::error::{Result, SpeechsetError};
use crate::store;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SpeakerDb {
    /// Embedding dimension, fixed by the first insert.
    dim: Option<usize>,
    /// `speakers[id]` is the list of embeddings observed for that speaker.
    speakers: Vec<Vec<Vec<f32>>>,
}

/// One entry of a recheck plan: where an embedding would land under a new
/// threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReassignEntry {
    pub speaker_id: u32,
    pub embedding_index: usize,
    pub new_speaker_id: u32,
    pub similarity: f32,
}

fn normalize(embedding: &[f32]) -> Vec<f32> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        embedding.to_vec()
    } else {
        embedding.iter().map(|x| x / norm).collect()
    }
}

/// Cosine similarity of two unit vectors is their dot product.
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl SpeakerDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        store::read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        store::write_json_atomic(path, self)
    }

    #[must_use]
    pub fn speaker_count(&self) -> u32 {
        self.speakers.len() as u32
    }

    #[must_use]
    pub fn embedding_count(&self, speaker_id: u32) -> usize {
        self.speakers
            .get(speaker_id as usize)
            .map_or(0, Vec::len)
    }

    fn check_dim(&mut self, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            return Err(SpeechsetError::SpeakerDb {
                message: "empty embedding".to_string(),
            });
        }
        match self.dim {
            Some(dim) if dim != embedding.len() => Err(SpeechsetError::SpeakerDb {
                message: format!(
                    "embedding dimension {} does not match database dimension {dim}",
                    embedding.len()
                ),
            }),
            Some(_) => Ok(()),
            None => {
                self.dim = Some(embedding.len());
                Ok(())
            }
        }
    }

    /// Best match over every stored embedding: `(speaker_id, similarity)`.
    #[must_use]
    pub fn best_match(&self, embedding: &[f32]) -> Option<(u32, f32)> {
        let probe = normalize(embedding);
        let mut best: Option<(u32, f32)> = None;
        for (id, embeddings) in self.speakers.iter().enumerate() {
            for stored in embeddings {
                let sim = cosine(&probe, stored);
                if best.is_none_or(|(_, s)| sim > s) {
                    best = Some((id as u32, sim));
                }
            }
        }
        best
    }

    /// Assign an embedding to a speaker.
    ///
    /// Appends to the closest speaker when its similarity reaches
    /// `threshold`, otherwise creates a new speaker with the next dense id.
    pub fn assign(&mut self, embedding: &[f32], threshold: f32) -> Result<u32> {
        self.check_dim(embedding)?;
        let normalized = normalize(embedding);

        if let Some((id, sim)) = self.best_match(embedding) {
            if sim >= threshold {
                self.speakers[id as usize].push(normalized);
                return Ok(id);
            }
        }

        self.speakers.push(vec![normalized]);
        Ok(self.speakers.len() as u32 - 1)
    }

    /// Move every embedding of speaker `b` into speaker `a` and re-densify
    /// ids. Returns the full old-id to new-id remap so callers can rename
    /// on-disk speaker folders.
    ///
    /// Never runs during pipeline execution, only via the management command.
    pub fn merge(&mut self, a: u32, b: u32) -> Result<Vec<(u32, u32)>> {
        let count = self.speaker_count();
        if a == b {
            return Err(SpeechsetError::SpeakerDb {
                message: "cannot merge a speaker into itself".to_string(),
            });
        }
        if a >= count || b >= count {
            return Err(SpeechsetError::SpeakerDb {
                message: format!("speaker id out of range (have {count} speakers)"),
            });
        }

        let moved = std::mem::take(&mut self.speakers[b as usize]);
        self.speakers[a as usize].extend(moved);
        self.speakers.remove(b as usize);

        let remap = (0..count)
            .map(|old| {
                let new = if old == b {
                    if a > b {
                        a - 1
                    } else {
                        a
                    }
                } else if old > b {
                    old - 1
                } else {
                    old
                };
                (old, new)
            })
            .collect();
        Ok(remap)
    }

    /// Simulate re-assignment of every stored embedding under a new
    /// threshold, in insertion order, against a scratch database. Emits a
    /// plan; the database itself is not touched.
    pub fn recheck(&self, threshold: f32) -> Result<Vec<ReassignEntry>> {
        let mut scratch = Self::new();
        let mut plan = Vec::new();

        for (id, embeddings) in self.speakers.iter().enumerate() {
            for (index, embedding) in embeddings.iter().enumerate() {
                let similarity = scratch
                    .best_match(embedding)
                    .map_or(1.0, |(_, sim)| sim);
                let new_id = scratch.assign(embedding, threshold)?;
                plan.push(ReassignEntry {
                    speaker_id: id as u32,
                    embedding_index: index,
                    new_speaker_id: new_id,
                    similarity,
                });
            }
        }
        Ok(plan)
    }

    /// Replace the database contents with the outcome of a recheck plan.
    pub fn apply_recheck(&mut self, threshold: f32) -> Result<Vec<ReassignEntry>> {
        let plan = self.recheck(threshold)?;
        let mut rebuilt = Self::new();
        for entry in &plan {
            let embedding =
                self.speakers[entry.speaker_id as usize][entry.embedding_index].clone();
            rebuilt.assign(&embedding, threshold)?;
        }
        *self = rebuilt;
        Ok(plan)
    }
}

/// Process-wide handle: a mutex-guarded database bound to its on-disk blob.
/// `assign` takes the lock for the whole compare-and-insert; readers clone a
/// snapshot.
#[derive(Clone)]
pub struct SharedSpeakerDb {
    inner: Arc<Mutex<SpeakerDb>>,
    path: PathBuf,
}

impl SharedSpeakerDb {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(SpeakerDb::load(path)?)),
            path: path.to_path_buf(),
        })
    }

    /// Assign under the lock and persist the updated blob before releasing.
    pub fn assign(&self, embedding: &[f32], threshold: f32) -> Result<u32> {
        let mut db = self.inner.lock().unwrap();
        let id = db.assign(embedding, threshold)?;
        db.save(&self.path)?;
        Ok(id)
    }

    pub fn merge(&self, a: u32, b: u32) -> Result<Vec<(u32, u32)>> {
        let mut db = self.inner.lock().unwrap();
        let remap = db.merge(a, b)?;
        db.save(&self.path)?;
        Ok(remap)
    }

    /// Emit a reassignment plan under a new threshold without mutating.
    pub fn recheck(&self, threshold: f32) -> Result<Vec<ReassignEntry>> {
        self.inner.lock().unwrap().recheck(threshold)
    }

    /// Rebuild the database under a new threshold and persist it.
    pub fn apply_recheck(&self, threshold: f32) -> Result<Vec<ReassignEntry>> {
        let mut db = self.inner.lock().unwrap();
        let plan = db.apply_recheck(threshold)?;
        db.save(&self.path)?;
        Ok(plan)
    }

    #[must_use]
    pub fn snapshot(&self) -> SpeakerDb {
        self.inner.lock().unwrap().clone()
    }
}

/// Merge speaker `b` into `a`: database embeddings move over and the
/// curated `audio/speaker_<nn>/` folders are renamed to the new dense ids.
/// Management command only; never runs during pipeline execution.
pub fn join_speakers(
    project: &crate::project::Project,
    a: u32,
    b: u32,
) -> Result<Vec<(u32, u32)>> {
    let db = SharedSpeakerDb::open(&project.speaker_db_path())?;
    let remap = db.merge(a, b)?;

    // Apply folder renames through temporary names so shifting dense ids
    // never collides.
    let mut staged = Vec::new();
    for &(old, new) in &remap {
        if old == new && old != b {
            continue;
        }
        let old_dir = project.speaker_audio_dir(old);
        if !old_dir.is_dir() {
            continue;
        }
        let tmp = project.audio_dir().join(format!(".join_tmp_{old}"));
        std::fs::rename(&old_dir, &tmp)?;
        staged.push((tmp, new));
    }
    for (tmp, new) in staged {
        let target = project.speaker_audio_dir(new);
        if target.is_dir() {
            // Merge clip files into the existing folder.
            for entry in std::fs::read_dir(&tmp)? {
                let entry = entry?;
                std::fs::rename(entry.path(), target.join(entry.file_name()))?;
            }
            std::fs::remove_dir(&tmp)?;
        } else {
            std::fs::rename(&tmp, &target)?;
        }
    }
    Ok(remap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn axis(dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_first_assign_creates_speaker_zero() {
        let mut db = SpeakerDb::new();
        let id = db.assign(&axis(4, 0), 0.6).unwrap();
        assert_eq!(id, 0);
        assert_eq!(db.speaker_count(), 1);
    }

    #[test]
    fn test_dissimilar_embeddings_create_distinct_speakers() {
        let mut db = SpeakerDb::new();
        for i in 0..4 {
            let id = db.assign(&axis(4, i), 0.6).unwrap();
            assert_eq!(id, i as u32);
        }
        assert_eq!(db.speaker_count(), 4);
    }

    #[test]
    fn test_identical_embeddings_collapse_to_one_speaker() {
        let mut db = SpeakerDb::new();
        for _ in 0..5 {
            let id = db.assign(&axis(4, 1), 0.6).unwrap();
            assert_eq!(id, 0);
        }
        assert_eq!(db.speaker_count(), 1);
        assert_eq!(db.embedding_count(0), 5);
    }

    #[test]
    fn test_threshold_controls_reuse() {
        // Stored speaker along [1, 0]; probe at cos = 0.8.
        let mut db = SpeakerDb::new();
        db.assign(&[1.0, 0.0], 0.6).unwrap();

        let probe = [0.8, 0.6]; // unit vector, cosine 0.8 with [1, 0]

        let mut with_low = db.clone();
        assert_eq!(with_low.assign(&probe, 0.6).unwrap(), 0);

        let mut with_high = db.clone();
        assert_eq!(with_high.assign(&probe, 0.9).unwrap(), 1);
        assert_eq!(with_high.speaker_count(), 2);
    }

    #[test]
    fn test_embeddings_are_normalized_on_insert() {
        let mut db = SpeakerDb::new();
        db.assign(&[10.0, 0.0], 0.6).unwrap();
        // A unit vector in the same direction matches perfectly.
        let (id, sim) = db.best_match(&[1.0, 0.0]).unwrap();
        assert_eq!(id, 0);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut db = SpeakerDb::new();
        db.assign(&axis(4, 0), 0.6).unwrap();
        let err = db.assign(&axis(8, 0), 0.6).unwrap_err();
        assert!(matches!(err, SpeechsetError::SpeakerDb { .. }));
    }

    #[test]
    fn test_merge_moves_embeddings_and_redensifies() {
        let mut db = SpeakerDb::new();
        db.assign(&axis(4, 0), 0.6).unwrap(); // 0
        db.assign(&axis(4, 1), 0.6).unwrap(); // 1
        db.assign(&axis(4, 2), 0.6).unwrap(); // 2

        let remap = db.merge(0, 1).unwrap();
        assert_eq!(db.speaker_count(), 2);
        assert_eq!(db.embedding_count(0), 2);
        assert_eq!(remap, vec![(0, 0), (1, 0), (2, 1)]);
    }

    #[test]
    fn test_merge_rejects_self_and_out_of_range() {
        let mut db = SpeakerDb::new();
        db.assign(&axis(4, 0), 0.6).unwrap();
        assert!(db.merge(0, 0).is_err());
        assert!(db.merge(0, 5).is_err());
    }

    #[test]
    fn test_recheck_does_not_mutate() {
        let mut db = SpeakerDb::new();
        db.assign(&[1.0, 0.0], 0.9).unwrap();
        db.assign(&[0.8, 0.6], 0.9).unwrap(); // new speaker under 0.9

        let before = db.clone();
        let plan = db.recheck(0.6).unwrap();
        assert_eq!(db, before);

        // Under the looser threshold the second embedding folds into 0.
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].new_speaker_id, 0);
        assert_eq!(plan[1].new_speaker_id, 0);
    }

    #[test]
    fn test_apply_recheck_rebuilds() {
        let mut db = SpeakerDb::new();
        db.assign(&[1.0, 0.0], 0.9).unwrap();
        db.assign(&[0.8, 0.6], 0.9).unwrap();
        assert_eq!(db.speaker_count(), 2);

        db.apply_recheck(0.6).unwrap();
        assert_eq!(db.speaker_count(), 1);
        assert_eq!(db.embedding_count(0), 2);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("speaker_db.json");

        let mut db = SpeakerDb::new();
        db.assign(&axis(4, 0), 0.6).unwrap();
        db.assign(&axis(4, 1), 0.6).unwrap();
        db.save(&path).unwrap();

        let loaded = SpeakerDb::load(&path).unwrap();
        assert_eq!(loaded, db);
    }

    #[test]
    fn test_load_missing_gives_empty() {
        let dir = TempDir::new().unwrap();
        let db = SpeakerDb::load(&dir.path().join("speaker_db.json")).unwrap();
        assert_eq!(db.speaker_count(), 0);
    }

    #[test]
    fn test_join_speakers_moves_clip_folders() {
        let dir = TempDir::new().unwrap();
        let project = crate::project::Project::create(dir.path(), "show").unwrap();

        {
            let db = SharedSpeakerDb::open(&project.speaker_db_path()).unwrap();
            db.assign(&axis(4, 0), 0.6).unwrap(); // 0
            db.assign(&axis(4, 1), 0.6).unwrap(); // 1
            db.assign(&axis(4, 2), 0.6).unwrap(); // 2
        }
        for id in 0..3u32 {
            let d = project.speaker_audio_dir(id);
            std::fs::create_dir_all(&d).unwrap();
            std::fs::write(d.join(format!("clip_{id}.wav")), b"x").unwrap();
        }

        let remap = join_speakers(&project, 0, 1).unwrap();
        assert_eq!(remap, vec![(0, 0), (1, 0), (2, 1)]);

        let merged = project.speaker_audio_dir(0);
        assert!(merged.join("clip_0.wav").exists());
        assert!(merged.join("clip_1.wav").exists());
        assert!(project.speaker_audio_dir(1).join("clip_2.wav").exists());
        assert!(!project.speaker_audio_dir(2).exists());

        let db = SharedSpeakerDb::open(&project.speaker_db_path()).unwrap();
        assert_eq!(db.snapshot().speaker_count(), 2);
    }

    #[test]
    fn test_shared_db_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("speaker_db.json");

        {
            let shared = SharedSpeakerDb::open(&path).unwrap();
            assert_eq!(shared.assign(&axis(4, 0), 0.6).unwrap(), 0);
        }
        {
            // Cross-run reuse: similar embedding lands on the stored speaker.
            let shared = SharedSpeakerDb::open(&path).unwrap();
            assert_eq!(shared.assign(&axis(4, 0), 0.6).unwrap(), 0);
            assert_eq!(shared.assign(&axis(4, 2), 0.6).unwrap(), 1);
        }
    }
}
