//! Text normalization and fuzzy similarity for round-trip validation.

/// Normalize text for comparison: lowercase, strip punctuation, collapse
/// whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_words(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Word-level Levenshtein edit distance.
#[must_use]
pub fn levenshtein_words(reference: &[String], hypothesis: &[String]) -> usize {
    let m = reference.len();
    let n = hypothesis.len();
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(reference[i - 1] != hypothesis[j - 1]);
            curr[j] = std::cmp::min(
                std::cmp::min(prev[j] + 1, curr[j - 1] + 1),
                prev[j - 1] + cost,
            );
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

/// Fuzzy similarity between two texts, scaled to 0-100.
///
/// Token-level Levenshtein ratio on normalized text. Idempotent: the same
/// pair always scores the same.
#[must_use]
pub fn similarity(expected: &str, observed: &str) -> u8 {
    let ref_words = normalize_words(expected);
    let obs_words = normalize_words(observed);

    if ref_words.is_empty() && obs_words.is_empty() {
        return 100;
    }
    let longest = ref_words.len().max(obs_words.len());
    if longest == 0 {
        return 100;
    }

    let distance = levenshtein_words(&ref_words, &obs_words);
    let ratio = 1.0 - distance as f64 / longest as f64;
    (ratio.max(0.0) * 100.0).round() as u8
}
