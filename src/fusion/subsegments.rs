//! Sub-segment construction: finer cuts inside a main segment at clause
//! (comma) boundaries backed by real silence.

use crate::audio::silence::SilenceMap;
use crate::fusion::tokens::{detokenize, Token};
use crate::fusion::{FusionOptions, SegRange};

/// Cut a main segment's tokens into sub-segments.
///
/// A cut happens after a comma-terminated token whose trailing gap holds a
/// silence of at least half `min_silence_length_ms`. Sub-segments inherit
/// the parent's speaker; the outermost pads stay on the outermost subs.
pub fn build(
    main: &SegRange,
    tokens: &[&Token],
    silences: &SilenceMap,
    options: &FusionOptions,
) -> Vec<SegRange> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let half_min_silence = options.min_silence_length_ms / 2;

    let mut groups: Vec<Vec<&Token>> = vec![Vec::new()];
    for i in 0..tokens.len() {
        let token = tokens[i];
        groups.last_mut().expect("never empty").push(token);

        let is_last = i + 1 == tokens.len();
        if is_last || !token.ends_clause() {
            continue;
        }
        let next = tokens[i + 1];
        if trailing_silence_ms(token, next, silences) >= half_min_silence {
            groups.push(Vec::new());
        }
    }
    groups.retain(|group| !group.is_empty());

    let count = groups.len();
    let mut subs: Vec<SegRange> = groups
        .into_iter()
        .enumerate()
        .filter_map(|(i, group)| {
            let text = detokenize(&group);
            if text.is_empty() {
                return None;
            }
            let min_confidence = group
                .iter()
                .map(|t| t.confidence)
                .fold(f32::INFINITY, f32::min);
            Some(SegRange {
                start_ms: group[0].start_ms,
                end_ms: group[group.len() - 1].end_ms,
                pad_start_ms: if i == 0 { main.pad_start_ms } else { 0 },
                pad_end_ms: if i + 1 == count { main.pad_end_ms } else { 0 },
                speaker_id: main.speaker_id,
                text,
                min_confidence,
            })
        })
        .collect();

    if options.join_subsegments {
        subs = join_short(subs, options.max_sub_duration_ms);
    }
    subs
}

/// The longest silence inside the gap between two tokens, clipped to the
/// gap, in milliseconds.
fn trailing_silence_ms(token: &Token, next: &Token, silences: &SilenceMap) -> u64 {
    if next.start_ms <= token.end_ms {
        return 0;
    }
    silences
        .longest_in(token.end_ms, next.start_ms)
        .map_or(0, |(s, e)| e - s)
}

/// Merge adjacent subs while the combined span stays under the bound.
fn join_short(subs: Vec<SegRange>, max_duration_ms: u64) -> Vec<SegRange> {
    let mut merged: Vec<SegRange> = Vec::new();
    for sub in subs {
        match merged.last_mut() {
            Some(last) if sub.end_ms.saturating_sub(last.start_ms) < max_duration_ms => {
                last.text = format!("{} {}", last.text.trim_end(), sub.text.trim_start());
                last.end_ms = sub.end_ms;
                last.pad_end_ms = sub.pad_end_ms;
                last.min_confidence = last.min_confidence.min(sub.min_confidence);
            }
            _ => merged.push(sub),
        }
    }
    merged
}

/// True when any two sub-segments' bodies intersect.
#[must_use]
pub fn any_overlap(subs: &[SegRange]) -> bool {
    for i in 0..subs.len() {
        for j in (i + 1)..subs.len() {
            if subs[i].overlaps(&subs[j]) {
                return true;
            }
        }
    }
    false
}
