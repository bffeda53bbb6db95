//! Application-level configuration.
//!
//! Loaded from `~/.config/speechset/config.toml` (or `--config`). Missing
//! fields use defaults; per-project processing options live in the project's
//! own `settings.json` instead (see `settings`).

use crate::backends::command::{
    CommandAligner, CommandAsr, CommandDenoiser, CommandDiarizer, CommandEmbedder, CommandSpec,
    PassthroughDenoiser,
};
use crate::backends::{Backends, DiarizationKind};
use crate::error::{Result, SpeechsetError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub backends: BackendsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding all projects.
    pub projects_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            projects_dir: PathBuf::from("projects"),
        }
    }
}

/// External commands for the ML black boxes. Each is a whitespace-separated
/// command line; unset commands leave that stage unavailable (except
/// denoising, which falls back to a resample-only pass).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BackendsConfig {
    pub denoise_command: Option<String>,
    pub asr_command: Option<String>,
    pub diarize_command: Option<String>,
    pub embed_command: Option<String>,
    pub align_command: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| SpeechsetError::Config {
            message: format!("failed to parse {}: {e}", path.display()),
        })
    }

    /// Load from a file, or defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides:
    /// `SPEECHSET_PROJECTS_DIR`, `SPEECHSET_ASR_COMMAND`,
    /// `SPEECHSET_DIARIZE_COMMAND`, `SPEECHSET_EMBED_COMMAND`,
    /// `SPEECHSET_DENOISE_COMMAND`, `SPEECHSET_ALIGN_COMMAND`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("SPEECHSET_PROJECTS_DIR") {
            if !dir.is_empty() {
                self.storage.projects_dir = PathBuf::from(dir);
            }
        }
        for (var, slot) in [
            ("SPEECHSET_DENOISE_COMMAND", &mut self.backends.denoise_command),
            ("SPEECHSET_ASR_COMMAND", &mut self.backends.asr_command),
            ("SPEECHSET_DIARIZE_COMMAND", &mut self.backends.diarize_command),
            ("SPEECHSET_EMBED_COMMAND", &mut self.backends.embed_command),
            ("SPEECHSET_ALIGN_COMMAND", &mut self.backends.align_command),
        ] {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *slot = Some(value);
                }
            }
        }
        self
    }

    /// Default config file location: `~/.config/speechset/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("speechset")
            .join("config.toml")
    }

    /// Build just the ASR backend, for commands that need nothing else.
    pub fn build_asr(&self) -> Result<Arc<dyn crate::backends::SpeechToText>> {
        let asr_cmd = self.backends.asr_command.as_deref().ok_or_else(|| {
            SpeechsetError::Environment {
                what: "asr_command (set it in config.toml or SPEECHSET_ASR_COMMAND)".to_string(),
            }
        })?;
        Ok(Arc::new(CommandAsr::new(CommandSpec::parse(asr_cmd)?)))
    }

    /// Build the backend set for a pipeline run. Stages without a configured
    /// command are an environment error when required, so the failure shows
    /// up before any processing starts.
    pub fn build_backends(&self, diarization: DiarizationKind) -> Result<Backends> {
        let denoiser: Arc<dyn crate::backends::Denoiser> = match &self.backends.denoise_command {
            Some(cmd) => Arc::new(CommandDenoiser::new(CommandSpec::parse(cmd)?)),
            None => Arc::new(PassthroughDenoiser),
        };

        let asr_cmd = self.backends.asr_command.as_deref().ok_or_else(|| {
            SpeechsetError::Environment {
                what: "asr_command (set it in config.toml or SPEECHSET_ASR_COMMAND)".to_string(),
            }
        })?;
        let diarize_cmd = self.backends.diarize_command.as_deref().ok_or_else(|| {
            SpeechsetError::Environment {
                what: "diarize_command (set it in config.toml or SPEECHSET_DIARIZE_COMMAND)"
                    .to_string(),
            }
        })?;
        let embed_cmd = self.backends.embed_command.as_deref().ok_or_else(|| {
            SpeechsetError::Environment {
                what: "embed_command (set it in config.toml or SPEECHSET_EMBED_COMMAND)"
                    .to_string(),
            }
        })?;
        let align_cmd = self.backends.align_command.as_deref().ok_or_else(|| {
            SpeechsetError::Environment {
                what: "align_command (set it in config.toml or SPEECHSET_ALIGN_COMMAND)"
                    .to_string(),
            }
        })?;

        Ok(Backends {
            denoiser,
            asr: Arc::new(CommandAsr::new(CommandSpec::parse(asr_cmd)?)),
            diarizer: Arc::new(CommandDiarizer::new(
                CommandSpec::parse(diarize_cmd)?,
                diarization,
            )),
            embedder: Arc::new(CommandEmbedder::new(CommandSpec::parse(embed_cmd)?)),
            aligner: Arc::new(CommandAligner::new(CommandSpec::parse(align_cmd)?)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.storage.projects_dir, PathBuf::from("projects"));
        assert!(config.backends.asr_command.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [storage]
            projects_dir = "/data/projects"

            [backends]
            asr_command = "python3 tools/asr.py"
            diarize_command = "python3 tools/diarize.py"
            "#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.storage.projects_dir, PathBuf::from("/data/projects"));
        assert_eq!(
            config.backends.asr_command.as_deref(),
            Some("python3 tools/asr.py")
        );
        assert!(config.backends.embed_command.is_none());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "projects_dir = = broken").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, SpeechsetError::Config { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_build_backends_requires_asr() {
        let config = AppConfig::default();
        let err = config.build_backends(DiarizationKind::Pyannote).unwrap_err();
        assert!(matches!(err, SpeechsetError::Environment { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_build_backends_with_commands() {
        let mut config = AppConfig::default();
        config.backends.asr_command = Some("asr-tool".to_string());
        config.backends.diarize_command = Some("diarize-tool".to_string());
        config.backends.embed_command = Some("embed-tool".to_string());
        config.backends.align_command = Some("align-tool".to_string());

        let backends = config.build_backends(DiarizationKind::WeSpeaker).unwrap();
        assert_eq!(backends.diarizer.kind(), DiarizationKind::WeSpeaker);
        assert_eq!(backends.denoiser.name(), "passthrough");
    }
}
