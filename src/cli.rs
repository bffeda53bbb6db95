//! Command-line interface.
//!
//! Parsing only; `main` wires the parsed commands to the pipeline.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Training-ready speech datasets from long-form audio
#[derive(Parser, Debug)]
#[command(name = "speechset", version, about = "Training-ready speech datasets from long-form audio")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress the progress display
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a single raw file through the pipeline
    Process {
        /// Project name
        project: String,
        /// Raw file name (as uploaded into the project's raw/ directory)
        file: String,
        /// Force every stage, ignoring cached outputs
        #[arg(long = "override")]
        override_all: bool,
        /// Force re-segmentation (fusion onward)
        #[arg(long)]
        segment: bool,
        /// Stop before the segmentation stage
        #[arg(long)]
        skip: bool,
    },

    /// Process every raw file in a project
    Run {
        /// Project name
        project: String,
        /// Force every stage, ignoring cached outputs
        #[arg(long = "override")]
        override_all: bool,
        /// Force re-segmentation (fusion onward)
        #[arg(long)]
        segment: bool,
        /// Run round-trip validation after processing
        #[arg(long)]
        validate: bool,
        /// Remove per-file temporaries after the run
        #[arg(long)]
        clean: bool,
        /// Generate metadata.csv and phonetic alignments
        #[arg(long)]
        meta: bool,
        /// Copy good clips into audio/speaker_<nn>/
        #[arg(long)]
        copy: bool,
        /// Stop before the segmentation stage
        #[arg(long)]
        skip: bool,
    },

    /// Round-trip validation of good segment clips
    Validate {
        /// Project name
        project: String,
        /// Validation worker pool size
        #[arg(long, value_name = "N")]
        max_workers: Option<usize>,
        /// Similarity cutoff (0-100)
        #[arg(long, value_name = "T")]
        threshold: Option<u8>,
        /// Delete clips of segments that fail validation
        #[arg(long)]
        delete_bad: bool,
    },

    /// Per-speaker audio duration statistics
    Stats {
        /// Project name
        project: String,
    },

    /// Merge two global speakers into one
    Join {
        /// Project name
        project: String,
        /// The two speaker ids to merge, e.g. `0,3` (the second merges
        /// into the first)
        #[arg(long, value_name = "A,B")]
        speakers: String,
    },

    /// Re-run speaker assignment under a different similarity threshold
    Recheck {
        /// Project name
        project: String,
        /// New cosine similarity threshold
        #[arg(long, value_name = "TAU")]
        threshold: Option<f32>,
        /// Apply the reassignment plan instead of only printing it
        #[arg(long)]
        apply: bool,
    },

    /// Materialize the final dataset under output/
    Export {
        /// Project name
        project: String,
    },
}

/// Parse the `--speakers a,b` argument.
pub fn parse_speaker_pair(value: &str) -> Option<(u32, u32)> {
    let mut parts = value.split(',');
    let a = parts.next()?.trim().parse().ok()?;
    let b = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((a, b))
}
