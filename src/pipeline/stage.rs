//! Stage declarations: names, versions, dependencies and cache keys.
//!
//! Stages are sequenced by a topological sort over their declared
//! dependencies; ties keep declaration order so runs are reproducible.

use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Denoise,
    Silences,
    Split,
    Transcribe,
    Diarize,
    Segment,
    Validate,
    Meta,
    Align,
    Archive,
}

impl Stage {
    /// Declaration order; also the stable tie-break for scheduling.
    pub const ALL: [Stage; 10] = [
        Stage::Denoise,
        Stage::Silences,
        Stage::Split,
        Stage::Transcribe,
        Stage::Diarize,
        Stage::Segment,
        Stage::Validate,
        Stage::Meta,
        Stage::Align,
        Stage::Archive,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::Denoise => "denoise",
            Stage::Silences => "silences",
            Stage::Split => "split",
            Stage::Transcribe => "transcribe",
            Stage::Diarize => "diarize",
            Stage::Segment => "segment",
            Stage::Validate => "validate",
            Stage::Meta => "meta",
            Stage::Align => "align",
            Stage::Archive => "archive",
        }
    }

    /// Bumped when a stage's semantics (or its backend's documented
    /// non-determinism envelope) change, invalidating cached outputs.
    #[must_use]
    pub fn version(self) -> u32 {
        match self {
            Stage::Segment => 3,
            Stage::Split | Stage::Validate => 2,
            _ => 1,
        }
    }

    #[must_use]
    pub fn deps(self) -> &'static [Stage] {
        match self {
            Stage::Denoise => &[],
            Stage::Split => &[Stage::Denoise],
            Stage::Silences | Stage::Transcribe | Stage::Diarize => &[Stage::Split],
            Stage::Segment => &[Stage::Silences, Stage::Transcribe, Stage::Diarize],
            Stage::Validate => &[Stage::Segment],
            Stage::Meta => &[Stage::Segment],
            Stage::Align => &[Stage::Segment],
            Stage::Archive => &[Stage::Meta],
        }
    }

    /// Stages that run once per raw file.
    #[must_use]
    pub fn is_per_file(self) -> bool {
        matches!(self, Stage::Denoise | Stage::Split)
    }

    /// Stages that run once per split shard.
    #[must_use]
    pub fn is_per_split(self) -> bool {
        matches!(
            self,
            Stage::Silences | Stage::Transcribe | Stage::Diarize | Stage::Segment
        )
    }

    /// Stages that run once per project, after all files.
    #[must_use]
    pub fn is_project_wide(self) -> bool {
        !self.is_per_file() && !self.is_per_split()
    }

    /// The operator cache key: stage name, version, split id and a
    /// canonical hash of the options that influence the output.
    #[must_use]
    pub fn cache_key<T: Serialize>(self, split_id: &str, options: &T) -> String {
        // serde_json maps are ordered by key, so this is canonical.
        let options_json =
            serde_json::to_string(options).unwrap_or_else(|_| "null".to_string());
        let mut hasher = Sha256::new();
        hasher.update(options_json.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(16);
        for byte in &digest[..8] {
            hex.push_str(&format!("{byte:02x}"));
        }
        format!("{}:{}:{}:{}", self.name(), self.version(), split_id, hex)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Order `stages` so every stage follows its dependencies; ties keep
/// `Stage::ALL` declaration order.
#[must_use]
pub fn topological_order(stages: &[Stage]) -> Vec<Stage> {
    let mut remaining: Vec<Stage> = Stage::ALL
        .iter()
        .copied()
        .filter(|s| stages.contains(s))
        .collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        // First (in declaration order) stage whose in-set deps are done.
        let next = remaining
            .iter()
            .position(|s| {
                s.deps()
                    .iter()
                    .all(|d| !remaining.contains(d) || ordered.contains(d))
            })
            .expect("stage dependency graph is acyclic");
        ordered.push(remaining.remove(next));
    }
    ordered
}
