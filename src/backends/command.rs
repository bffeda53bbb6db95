//! External-command backend implementations.
//!
//! Each backend wraps a user-configured command line. The command receives
//! positional arguments and must write its result to stdout (JSON tokens,
//! diarization CSV, embedding array, phone array) or produce the named
//! output file (denoiser). Models that are not thread-safe get serialized
//! behind the backend's own mutex.

use crate::backends::{
    turns_from_csv, Denoiser, DiarizationKind, DiarizationTurn, Diarizer, EmbeddingExtractor,
    Phone, PhoneticAligner, SpeechToText,
};
use crate::error::{Result, SpeechsetError};
use crate::fusion::tokens::TokenStream;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use tracing::debug;

/// A configured command line: program plus fixed leading arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Parse a whitespace-separated command string from config.
    pub fn parse(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| SpeechsetError::Config {
            message: "empty backend command".to_string(),
        })?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Run with extra arguments appended, capturing stdout.
    fn run(&self, extra: &[&str]) -> Result<String> {
        debug!(program = %self.program, ?extra, "running backend command");
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(extra)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SpeechsetError::Environment {
                        what: format!("command `{}` not found on PATH", self.program),
                    }
                } else {
                    SpeechsetError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let status = output.status.code().unwrap_or(-1);
            let suffix = if stderr.trim().is_empty() {
                String::new()
            } else {
                format!("; stderr: {}", stderr.trim())
            };
            return Err(SpeechsetError::Other(format!(
                "`{}` exited with status {status}{suffix}",
                self.program
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Denoiser invoking `<command> <input> <output>`.
pub struct CommandDenoiser {
    spec: CommandSpec,
    serial: Mutex<()>,
}

impl CommandDenoiser {
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            serial: Mutex::new(()),
        }
    }
}

impl Denoiser for CommandDenoiser {
    fn denoise(&self, input: &Path, output: &Path) -> Result<()> {
        let _guard = self.serial.lock().unwrap();
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.spec
            .run(&[&input.display().to_string(), &output.display().to_string()])?;
        if !output.exists() {
            return Err(SpeechsetError::Other(format!(
                "denoise command produced no output at {}",
                output.display()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.spec.program
    }
}

/// Denoiser fallback when no external tool is configured: resample to the
/// pipeline's canonical 16kHz mono WAV without altering content.
#[derive(Debug, Default)]
pub struct PassthroughDenoiser;

impl Denoiser for PassthroughDenoiser {
    fn denoise(&self, input: &Path, output: &Path) -> Result<()> {
        let samples = crate::audio::read_wav_mono(input)?;
        crate::audio::write_wav_mono(output, &samples)
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

/// ASR invoking `<command> --language <lang> <audio>`; stdout must be the
/// tokens JSON (`{"tokens": [...]}`).
pub struct CommandAsr {
    spec: CommandSpec,
    serial: Mutex<()>,
}

impl CommandAsr {
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            serial: Mutex::new(()),
        }
    }
}

impl SpeechToText for CommandAsr {
    fn transcribe(&self, audio: &Path, language: &str) -> Result<TokenStream> {
        let _guard = self.serial.lock().unwrap();
        let stdout = self
            .spec
            .run(&["--language", language, &audio.display().to_string()])?;
        serde_json::from_str(&stdout)
            .map_err(|e| SpeechsetError::Other(format!("ASR output was not tokens JSON: {e}")))
    }

    fn name(&self) -> &str {
        &self.spec.program
    }
}

/// Diarizer invoking `<command> [--max-speakers N] <audio>`; stdout must be
/// `speaker,start,end` CSV in seconds.
pub struct CommandDiarizer {
    spec: CommandSpec,
    kind: DiarizationKind,
    serial: Mutex<()>,
}

impl CommandDiarizer {
    #[must_use]
    pub fn new(spec: CommandSpec, kind: DiarizationKind) -> Self {
        Self {
            spec,
            kind,
            serial: Mutex::new(()),
        }
    }
}

impl Diarizer for CommandDiarizer {
    fn diarize(&self, audio: &Path, max_speakers: Option<u32>) -> Result<Vec<DiarizationTurn>> {
        let _guard = self.serial.lock().unwrap();
        let audio_arg = audio.display().to_string();
        let stdout = match max_speakers {
            Some(n) if n > 0 => {
                let n = n.to_string();
                self.spec.run(&["--max-speakers", &n, &audio_arg])?
            }
            _ => self.spec.run(&[audio_arg.as_str()])?,
        };
        turns_from_csv(&stdout, audio)
    }

    fn kind(&self) -> DiarizationKind {
        self.kind
    }
}

/// Embedding extractor invoking `<command> <audio> <start_ms> <end_ms>`;
/// stdout must be a JSON array of floats.
pub struct CommandEmbedder {
    spec: CommandSpec,
    serial: Mutex<()>,
}

impl CommandEmbedder {
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            serial: Mutex::new(()),
        }
    }
}

impl EmbeddingExtractor for CommandEmbedder {
    fn extract(&self, audio: &Path, start_ms: u64, end_ms: u64) -> Result<Vec<f32>> {
        let _guard = self.serial.lock().unwrap();
        let stdout = self.spec.run(&[
            &audio.display().to_string(),
            &start_ms.to_string(),
            &end_ms.to_string(),
        ])?;
        serde_json::from_str(&stdout).map_err(|e| {
            SpeechsetError::Other(format!("embedding output was not a float array: {e}"))
        })
    }
}

/// Aligner invoking `<command> --language <lang> <audio> <text>`; stdout
/// must be a JSON array of `{label, start_ms, end_ms}` phones.
pub struct CommandAligner {
    spec: CommandSpec,
    serial: Mutex<()>,
}

impl CommandAligner {
    #[must_use]
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            serial: Mutex::new(()),
        }
    }
}

impl PhoneticAligner for CommandAligner {
    fn align(&self, audio: &Path, text: &str, language: &str) -> Result<Vec<Phone>> {
        let _guard = self.serial.lock().unwrap();
        let stdout = self.spec.run(&[
            "--language",
            language,
            &audio.display().to_string(),
            text,
        ])?;
        serde_json::from_str(&stdout)
            .map_err(|e| SpeechsetError::Other(format!("aligner output was not phones JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_command_spec_parse() {
        let spec = CommandSpec::parse("python3 tools/diarize.py --device cpu").unwrap();
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args, vec!["tools/diarize.py", "--device", "cpu"]);
    }

    #[test]
    fn test_command_spec_parse_empty() {
        assert!(CommandSpec::parse("   ").is_err());
    }

    #[test]
    fn test_missing_program_is_environment_error() {
        let spec = CommandSpec::parse("definitely-not-a-real-binary-9921").unwrap();
        let err = spec.run(&[]).unwrap_err();
        assert!(matches!(err, SpeechsetError::Environment { .. }));
    }

    #[test]
    fn test_run_captures_stdout() {
        let spec = CommandSpec::parse("echo hello").unwrap();
        let out = spec.run(&["world"]).unwrap();
        assert_eq!(out.trim(), "hello world");
    }

    #[test]
    fn test_nonzero_status_reported() {
        let spec = CommandSpec::parse("false").unwrap();
        let err = spec.run(&[]).unwrap_err();
        assert!(err.to_string().contains("status"));
    }

    #[test]
    fn test_passthrough_denoiser_normalizes() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("raw.wav");
        let output = dir.path().join("clean.wav");
        crate::audio::write_wav_mono(&input, &vec![500i16; 1600]).unwrap();

        PassthroughDenoiser.denoise(&input, &output).unwrap();
        let cleaned = crate::audio::read_wav_mono(&output).unwrap();
        assert_eq!(cleaned.len(), 1600);
    }
}
