//! Error types for speechset.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechsetError {
    // Configuration errors: fatal, surfaced immediately
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Missing external dependency: {what}")]
    Environment { what: String },

    // Input errors: fail the file, other files continue
    #[error("Unreadable input {path}: {message}")]
    Input { path: PathBuf, message: String },

    // Operator errors: fail the current stage, downstream stages skipped
    #[error("Stage {stage} failed: {message}")]
    Operator { stage: String, message: String },

    // Artifact invariant violated on read
    #[error("Inconsistent artifact {path}: {message}")]
    Consistency { path: PathBuf, message: String },

    #[error("Job already processing: {key}")]
    AlreadyProcessing { key: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Speaker database error: {message}")]
    SpeakerDb { message: String },

    #[error("Project not found: {name}")]
    ProjectNotFound { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Audio error: {message}")]
    Audio { message: String },

    #[error("{0}")]
    Other(String),
}

impl SpeechsetError {
    /// Process exit code per failure class: 2 is reserved for clap's own
    /// argument errors, 3 for environment/config problems, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. }
            | Self::ConfigInvalidValue { .. }
            | Self::Environment { .. } => 3,
            _ => 1,
        }
    }

    /// True when the error should stop the whole run rather than just the
    /// current file.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::ConfigInvalidValue { .. }
                | Self::Environment { .. }
                | Self::Cancelled
        )
    }

    pub fn operator(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operator {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn consistency(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Consistency {
            path: path.into(),
            message: message.into(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SpeechsetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = SpeechsetError::Config {
            message: "missing projects directory".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration error: missing projects directory"
        );
    }

    #[test]
    fn test_operator_error_display() {
        let error = SpeechsetError::operator("transcribe", "backend exited with status 1");
        assert_eq!(
            error.to_string(),
            "Stage transcribe failed: backend exited with status 1"
        );
    }

    #[test]
    fn test_consistency_error_display() {
        let error = SpeechsetError::consistency("/p/split_silences.json", "unsorted intervals");
        assert!(error.to_string().contains("split_silences.json"));
        assert!(error.to_string().contains("unsorted intervals"));
    }

    #[test]
    fn test_exit_codes() {
        let env = SpeechsetError::Environment {
            what: "asr command".to_string(),
        };
        assert_eq!(env.exit_code(), 3);

        let op = SpeechsetError::operator("diarize", "boom");
        assert_eq!(op.exit_code(), 1);

        let cancelled = SpeechsetError::Cancelled;
        assert_eq!(cancelled.exit_code(), 1);
    }

    #[test]
    fn test_fatal_classification() {
        assert!(SpeechsetError::Config {
            message: "x".to_string()
        }
        .is_fatal());
        assert!(SpeechsetError::Cancelled.is_fatal());
        assert!(!SpeechsetError::operator("segment", "x").is_fatal());
        assert!(!SpeechsetError::Input {
            path: PathBuf::from("a.wav"),
            message: "bad header".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: SpeechsetError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SpeechsetError>();
        assert_sync::<SpeechsetError>();
    }
}
