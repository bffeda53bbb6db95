//! Word-level ASR token stream.
//!
//! The transcription artifact is a JSON object with a single `tokens` key.
//! Tokens are sorted by start time; zero-duration tokens are dropped on
//! load with a logged warning.

use crate::error::{Result, SpeechsetError};
use crate::store;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

pub const SENTENCE_END: [char; 3] = ['.', '!', '?'];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Local speaker label emitted by the ASR backend, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

fn default_confidence() -> f32 {
    1.0
}

impl Token {
    #[must_use]
    pub fn midpoint_ms(&self) -> u64 {
        (self.start_ms + self.end_ms) / 2
    }

    /// True when the token text carries sentence-terminal punctuation.
    #[must_use]
    pub fn ends_sentence(&self) -> bool {
        self.text.chars().any(|c| SENTENCE_END.contains(&c))
    }

    /// True when the token text carries a comma.
    #[must_use]
    pub fn ends_clause(&self) -> bool {
        self.text.contains(',')
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenStream {
    pub tokens: Vec<Token>,
}

impl TokenStream {
    /// Load a transcription artifact, enforcing ordering invariants and
    /// discarding zero-duration tokens.
    pub fn load(path: &Path) -> Result<Self> {
        let mut stream: Self = store::read_json(path)?;

        let before = stream.tokens.len();
        stream.tokens.retain(|t| t.start_ms < t.end_ms);
        let dropped = before - stream.tokens.len();
        if dropped > 0 {
            warn!(
                artifact = %path.display(),
                dropped,
                "dropped zero-duration tokens"
            );
        }

        for pair in stream.tokens.windows(2) {
            if pair[1].start_ms < pair[0].start_ms {
                return Err(SpeechsetError::consistency(
                    path,
                    format!(
                        "tokens out of order: {} before {}",
                        pair[0].start_ms, pair[1].start_ms
                    ),
                ));
            }
        }

        Ok(stream)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        store::write_json_atomic(path, self)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Join token texts into segment text: single-space separated, whitespace
/// collapsed, spaces before punctuation removed, leading/trailing
/// punctuation stripped except sentence enders.
#[must_use]
pub fn detokenize(tokens: &[&Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        let piece = token.text.trim();
        if piece.is_empty() {
            continue;
        }
        let punct_only = piece.chars().all(|c| c.is_ascii_punctuation());
        if !out.is_empty() && !punct_only {
            out.push(' ');
        }
        out.push_str(piece);
    }

    let trimmed = out
        .trim_matches(|c: char| {
            c.is_whitespace() || (c.is_ascii_punctuation() && !SENTENCE_END.contains(&c))
        })
        .to_string();

    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tok(text: &str, start: u64, end: u64) -> Token {
        Token {
            text: text.to_string(),
            start_ms: start,
            end_ms: end,
            confidence: 1.0,
            speaker: None,
        }
    }

    #[test]
    fn test_midpoint() {
        assert_eq!(tok("a", 100, 300).midpoint_ms(), 200);
    }

    #[test]
    fn test_sentence_and_clause_detection() {
        assert!(tok("done.", 0, 10).ends_sentence());
        assert!(tok("what?", 0, 10).ends_sentence());
        assert!(tok("now!", 0, 10).ends_sentence());
        assert!(!tok("word", 0, 10).ends_sentence());
        assert!(tok("first,", 0, 10).ends_clause());
        assert!(!tok("first", 0, 10).ends_clause());
    }

    #[test]
    fn test_detokenize_joins_with_spaces() {
        let a = tok("Hello", 0, 100);
        let b = tok("world.", 100, 200);
        assert_eq!(detokenize(&[&a, &b]), "Hello world.");
    }

    #[test]
    fn test_detokenize_attaches_punctuation_tokens() {
        let a = tok("Hello", 0, 100);
        let b = tok(",", 100, 110);
        let c = tok("world", 110, 200);
        let d = tok(".", 200, 210);
        assert_eq!(detokenize(&[&a, &b, &c, &d]), "Hello, world.");
    }

    #[test]
    fn test_detokenize_strips_leading_punctuation_keeps_sentence_end() {
        let a = tok(", Hello", 0, 100);
        let b = tok("world.", 100, 200);
        assert_eq!(detokenize(&[&a, &b]), "Hello world.");
    }

    #[test]
    fn test_detokenize_collapses_whitespace() {
        let a = tok("  Hello  ", 0, 100);
        let b = tok("world", 100, 200);
        assert_eq!(detokenize(&[&a, &b]), "Hello world");
    }

    #[test]
    fn test_detokenize_empty() {
        assert_eq!(detokenize(&[]), "");
    }

    #[test]
    fn test_load_drops_zero_duration_tokens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t_transcription.json");
        let stream = TokenStream {
            tokens: vec![tok("ok", 0, 100), tok("ghost", 200, 200), tok("end.", 300, 400)],
        };
        stream.save(&path).unwrap();

        let loaded = TokenStream::load(&path).unwrap();
        assert_eq!(loaded.tokens.len(), 2);
        assert_eq!(loaded.tokens[1].text, "end.");
    }

    #[test]
    fn test_load_rejects_unsorted_tokens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t_transcription.json");
        let stream = TokenStream {
            tokens: vec![tok("b", 500, 600), tok("a", 0, 100)],
        };
        stream.save(&path).unwrap();

        let err = TokenStream::load(&path).unwrap_err();
        assert!(matches!(err, SpeechsetError::Consistency { .. }));
    }

    #[test]
    fn test_json_root_key_is_tokens() {
        let stream = TokenStream {
            tokens: vec![tok("hi", 0, 100)],
        };
        let json = serde_json::to_value(&stream).unwrap();
        assert!(json.get("tokens").is_some());
    }

    #[test]
    fn test_confidence_defaults_to_one() {
        let json = r#"{"tokens":[{"text":"hi","start_ms":0,"end_ms":100}]}"#;
        let stream: TokenStream = serde_json::from_str(json).unwrap();
        assert_eq!(stream.tokens[0].confidence, 1.0);
    }
}
