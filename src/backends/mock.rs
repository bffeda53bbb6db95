//! Mock backend implementations for testing.
//!
//! Each mock is deterministic and configurable through a builder-style API,
//! mirroring how the pipeline drives the real backends.

use crate::backends::{
    Denoiser, DiarizationKind, DiarizationTurn, Diarizer, EmbeddingExtractor, Phone,
    PhoneticAligner, SpeechToText,
};
use crate::error::{Result, SpeechsetError};
use crate::fusion::tokens::TokenStream;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

/// Denoiser that copies its input unchanged.
#[derive(Debug, Default)]
pub struct MockDenoiser {
    should_fail: bool,
}

impl MockDenoiser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Denoiser for MockDenoiser {
    fn denoise(&self, input: &Path, output: &Path) -> Result<()> {
        if self.should_fail {
            return Err(SpeechsetError::operator("denoise", "mock denoise failure"));
        }
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(input, output)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock-denoiser"
    }
}

/// Transcriber that returns a canned token stream.
///
/// With several responses configured, they are returned in order per call;
/// the last response repeats once the queue drains.
pub struct MockSpeechToText {
    responses: Mutex<VecDeque<TokenStream>>,
    last: Mutex<TokenStream>,
    should_fail: bool,
    calls: Mutex<Vec<String>>,
}

impl MockSpeechToText {
    #[must_use]
    pub fn new(response: TokenStream) -> Self {
        Self {
            last: Mutex::new(response.clone()),
            responses: Mutex::new(VecDeque::from([response])),
            should_fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_responses(responses: Vec<TokenStream>) -> Self {
        let last = responses.last().cloned().unwrap_or_default();
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(last),
            should_fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Audio paths seen so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl SpeechToText for MockSpeechToText {
    fn transcribe(&self, audio: &Path, _language: &str) -> Result<TokenStream> {
        self.calls
            .lock()
            .unwrap()
            .push(audio.display().to_string());
        if self.should_fail {
            return Err(SpeechsetError::operator(
                "transcribe",
                "mock transcription failure",
            ));
        }
        match self.responses.lock().unwrap().pop_front() {
            Some(stream) => {
                *self.last.lock().unwrap() = stream.clone();
                Ok(stream)
            }
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }

    fn name(&self) -> &str {
        "mock-asr"
    }
}

/// Diarizer that returns fixed turns.
pub struct MockDiarizer {
    turns: Vec<DiarizationTurn>,
    kind: DiarizationKind,
    should_fail: bool,
}

impl MockDiarizer {
    #[must_use]
    pub fn new(turns: Vec<DiarizationTurn>) -> Self {
        Self {
            turns,
            kind: DiarizationKind::Pyannote,
            should_fail: false,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: DiarizationKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Diarizer for MockDiarizer {
    fn diarize(&self, _audio: &Path, _max_speakers: Option<u32>) -> Result<Vec<DiarizationTurn>> {
        if self.should_fail {
            return Err(SpeechsetError::operator("diarize", "mock diarize failure"));
        }
        Ok(self.turns.clone())
    }

    fn kind(&self) -> DiarizationKind {
        self.kind
    }
}

/// Embedding extractor that hands out queued vectors in call order.
///
/// Once the queue drains, a deterministic fallback derived from the window
/// start is returned so unrelated calls stay stable.
pub struct MockEmbeddingExtractor {
    queued: Mutex<VecDeque<Vec<f32>>>,
    dim: usize,
}

impl MockEmbeddingExtractor {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            dim,
        }
    }

    #[must_use]
    pub fn with_queued(self, embeddings: Vec<Vec<f32>>) -> Self {
        *self.queued.lock().unwrap() = embeddings.into();
        self
    }
}

impl EmbeddingExtractor for MockEmbeddingExtractor {
    fn extract(&self, _audio: &Path, start_ms: u64, _end_ms: u64) -> Result<Vec<f32>> {
        if let Some(e) = self.queued.lock().unwrap().pop_front() {
            return Ok(e);
        }
        let mut v = vec![0.0; self.dim];
        v[(start_ms as usize) % self.dim] = 1.0;
        Ok(v)
    }
}

/// Aligner that emits one phone per word, evenly spaced.
#[derive(Debug, Default)]
pub struct MockAligner;

impl PhoneticAligner for MockAligner {
    fn align(&self, _audio: &Path, text: &str, _language: &str) -> Result<Vec<Phone>> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let step = 100u64;
        Ok(words
            .iter()
            .enumerate()
            .map(|(i, w)| Phone {
                label: w.to_lowercase(),
                start_ms: i as u64 * step,
                end_ms: (i as u64 + 1) * step,
            })
            .collect())
    }
}
