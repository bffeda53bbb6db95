//! Filesystem-backed artifact store.
//!
//! Every artifact the pipeline emits goes through `write_atomic`: the bytes
//! land in a temporary sibling file and become visible in one `rename`.
//! Readers therefore never observe a half-written artifact; the orchestrator,
//! not the store, enforces dependency order between artifacts.

use crate::error::{Result, SpeechsetError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_sibling(path: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{}.{}.{}.tmp", name, process::id(), n))
}

/// Write bytes to `path` atomically (temp file in the same directory, then
/// rename). Creates parent directories as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes)?;
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e.into())
        }
    }
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Read and deserialize a JSON artifact. Malformed content surfaces as a
/// `Consistency` error naming the artifact; the file itself is left alone.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SpeechsetError::Io(e)
        } else {
            SpeechsetError::consistency(path, e.to_string())
        }
    })?;
    serde_json::from_slice(&bytes).map_err(|e| SpeechsetError::consistency(path, e.to_string()))
}

/// The modification time of `path`, if it exists.
pub fn mtime(path: &Path) -> Option<std::time::SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// True when every `output` exists and none is older than any `input`.
/// This is the skip rule every operator shares.
pub fn outputs_fresh(inputs: &[PathBuf], outputs: &[PathBuf]) -> bool {
    let mut newest_input: Option<std::time::SystemTime> = None;
    for input in inputs {
        match mtime(input) {
            Some(t) => {
                if newest_input.is_none_or(|n| t > n) {
                    newest_input = Some(t);
                }
            }
            // A missing input means the stage cannot be skipped; the run
            // itself will fail with a proper error.
            None => return false,
        }
    }
    for output in outputs {
        match mtime(output) {
            Some(t) => {
                if let Some(n) = newest_input {
                    if t < n {
                        return false;
                    }
                }
            }
            None => return false,
        }
    }
    true
}
