//! The fusion passes: token/diarization alignment, speaker mapping, main
//! segment formation, silence padding, overlap resolution and verdicts.

use crate::audio::silence::SilenceMap;
use crate::backends::DiarizationTurn;
use crate::defaults::MIN_GOOD_CONFIDENCE;
use crate::fusion::subsegments;
use crate::fusion::tokens::{detokenize, Token, TokenStream};
use crate::fusion::{FusionOptions, SegRange, Segment, SegmentStatus};
use std::collections::HashMap;
use tracing::warn;

/// A token carrying its resolved global speaker, `None` when unknown.
#[derive(Debug, Clone)]
pub(crate) struct AlignedToken<'a> {
    pub token: &'a Token,
    pub speaker: Option<u32>,
}

/// Fuse one split's annotation streams into segments.
///
/// `assign_speaker` maps a backend-local diarization label to a global
/// speaker id; returning `None` downgrades that label's tokens to unknown
/// instead of failing the split.
pub fn fuse(
    tokens: &TokenStream,
    turns: &[DiarizationTurn],
    silences: &SilenceMap,
    options: &FusionOptions,
    mut assign_speaker: impl FnMut(&str) -> Option<u32>,
) -> Vec<Segment> {
    if tokens.is_empty() {
        return Vec::new();
    }

    // Steps 1+2: attach tokens to diarization intervals, then swap local
    // labels for global speaker ids.
    let aligned = align_tokens(tokens, turns, options.silence_pad_ms, &mut assign_speaker);

    // Step 3: scan tokens in order, cutting main segments.
    let groups = form_groups(&aligned, silences, options.min_silence_length_ms);

    // A speaker can talk for minutes without a boundary; keep clips
    // trainable by subdividing oversized runs at their widest token gap.
    let groups = enforce_max_duration(
        groups,
        &aligned,
        options.min_segment_duration_ms,
        options.max_segment_duration_ms,
    );

    // Bounds first; padding needs every neighbour's body.
    let bounds: Vec<(u64, u64)> = groups
        .iter()
        .map(|group| {
            let first = aligned[group[0]].token;
            let last = aligned[*group.last().expect("groups are non-empty")].token;
            (first.start_ms, last.end_ms)
        })
        .collect();

    let mut segments = Vec::new();
    for (i, group) in groups.iter().enumerate() {
        let (start_ms, end_ms) = bounds[i];
        let group_tokens: Vec<&Token> = group.iter().map(|&idx| aligned[idx].token).collect();

        // Step 5: text and confidence.
        let text = detokenize(&group_tokens);
        if text.is_empty() {
            warn!(start_ms, end_ms, "dropping segment with empty text");
            continue;
        }
        let min_confidence = group_tokens
            .iter()
            .map(|t| t.confidence)
            .fold(f32::INFINITY, f32::min);

        // All tokens in a group share one speaker by construction.
        let speaker_id = aligned[group[0]].speaker.unwrap_or(0);

        // Step 4: snap each edge to the surrounding silence, never crossing
        // a neighbouring segment's body.
        let prev_end = if i > 0 { Some(bounds[i - 1].1) } else { None };
        let next_start = bounds.get(i + 1).map(|&(start, _)| start);
        let pad_start_ms = pad_before(start_ms, silences, options.silence_pad_ms, prev_end);
        let pad_end_ms = pad_after(end_ms, silences, options.silence_pad_ms, next_start);

        let main = SegRange {
            start_ms,
            end_ms,
            pad_start_ms,
            pad_end_ms,
            speaker_id,
            text,
            min_confidence,
        };

        // Step 6: finer cuts at clause boundaries.
        let subs = if options.build_subsegments {
            subsegments::build(&main, &group_tokens, silences, options)
        } else {
            Vec::new()
        };

        segments.push(Segment {
            seg_idx: 0,
            main,
            subs,
            status: SegmentStatus::Good,
        });
    }

    // Step 7: overlapping segments are both bad; overlap with a foreign
    // speaker is never silently merged. Sub overlap poisons the parent.
    let overlapping = mark_overlaps(&segments);
    for (i, segment) in segments.iter_mut().enumerate() {
        if overlapping[i] {
            segment.status = SegmentStatus::Bad;
        }
        if subsegments::any_overlap(&segment.subs) {
            segment.status = SegmentStatus::Bad;
        }
        // Step 8: default verdict from confidence.
        if segment.main.min_confidence < MIN_GOOD_CONFIDENCE {
            segment.status = SegmentStatus::Bad;
        }
    }

    for (i, segment) in segments.iter_mut().enumerate() {
        segment.seg_idx = i + 1;
    }
    segments
}

/// Steps 1+2. With an empty diarization track the whole split belongs to
/// speaker 0.
fn align_tokens<'a>(
    tokens: &'a TokenStream,
    turns: &[DiarizationTurn],
    pad_ms: u64,
    assign_speaker: &mut impl FnMut(&str) -> Option<u32>,
) -> Vec<AlignedToken<'a>> {
    if turns.is_empty() {
        return tokens
            .tokens
            .iter()
            .map(|token| AlignedToken {
                token,
                speaker: Some(0),
            })
            .collect();
    }

    // Resolve each distinct local label once, in order of first appearance.
    let mut label_ids: HashMap<&str, Option<u32>> = HashMap::new();

    tokens
        .tokens
        .iter()
        .map(|token| {
            let label = nearest_label(token, turns, pad_ms);
            let speaker = match label {
                Some(label) => *label_ids
                    .entry(label)
                    .or_insert_with(|| assign_speaker(label)),
                None => None,
            };
            AlignedToken { token, speaker }
        })
        .collect()
}

/// The diarization label for a token: the interval containing its midpoint,
/// else the nearest interval within `pad_ms`, else none.
fn nearest_label<'a>(
    token: &Token,
    turns: &'a [DiarizationTurn],
    pad_ms: u64,
) -> Option<&'a str> {
    let mid = token.midpoint_ms();

    let mut best: Option<(&str, u64)> = None;
    for turn in turns {
        let (start, end) = (turn.start_ms(), turn.end_ms());
        let distance = if mid < start {
            start - mid
        } else if mid >= end {
            mid - end
        } else {
            return Some(turn.speaker.as_str());
        };
        if distance <= pad_ms && best.is_none_or(|(_, d)| distance < d) {
            best = Some((turn.speaker.as_str(), distance));
        }
    }
    best.map(|(label, _)| label)
}

/// Step 3: a new segment starts when the speaker changes, when the
/// inter-token gap reaches `min_silence_length_ms` and lies fully inside a
/// silence interval, or after sentence-terminal punctuation.
fn form_groups(
    aligned: &[AlignedToken<'_>],
    silences: &SilenceMap,
    min_silence_length_ms: u64,
) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for (i, at) in aligned.iter().enumerate() {
        let boundary = match groups.last() {
            None => true,
            Some(group) => {
                let prev = &aligned[*group.last().expect("groups are non-empty")];
                let gap = at.token.start_ms.saturating_sub(prev.token.end_ms);
                prev.speaker != at.speaker
                    || (gap >= min_silence_length_ms
                        && silences.covers(prev.token.end_ms, at.token.start_ms))
                    || prev.token.ends_sentence()
            }
        };
        if boundary {
            groups.push(vec![i]);
        } else {
            groups.last_mut().expect("just pushed").push(i);
        }
    }
    groups
}

/// Subdivide groups whose token span exceeds `max_ms`. Each cut lands on
/// the widest inter-token gap whose prefix stays within the bound,
/// avoiding prefixes shorter than `min_ms` when a longer one is available.
fn enforce_max_duration(
    groups: Vec<Vec<usize>>,
    aligned: &[AlignedToken<'_>],
    min_ms: u64,
    max_ms: u64,
) -> Vec<Vec<usize>> {
    let span_of = |group: &[usize]| {
        let first = aligned[group[0]].token.start_ms;
        let last = aligned[*group.last().expect("groups are non-empty")].token.end_ms;
        last.saturating_sub(first)
    };

    let mut out = Vec::with_capacity(groups.len());
    for group in groups {
        let mut rest = group;
        while rest.len() > 1 && span_of(&rest) > max_ms {
            let cut = pick_duration_cut(&rest, aligned, min_ms, max_ms);
            let tail = rest.split_off(cut + 1);
            out.push(rest);
            rest = tail;
        }
        out.push(rest);
    }
    out
}

/// The token index to cut after when a group is too long.
fn pick_duration_cut(
    group: &[usize],
    aligned: &[AlignedToken<'_>],
    min_ms: u64,
    max_ms: u64,
) -> usize {
    let first_start = aligned[group[0]].token.start_ms;
    let mut best: Option<(usize, u64)> = None;
    let mut fallback: Option<(usize, u64)> = None;

    for k in 0..group.len() - 1 {
        let current = aligned[group[k]].token;
        let prefix = current.end_ms.saturating_sub(first_start);
        if prefix > max_ms {
            break;
        }
        let gap = aligned[group[k + 1]]
            .token
            .start_ms
            .saturating_sub(current.end_ms);
        if prefix >= min_ms {
            if best.is_none_or(|(_, g)| gap > g) {
                best = Some((k, gap));
            }
        } else if fallback.is_none_or(|(_, g)| gap > g) {
            fallback = Some((k, gap));
        }
    }
    // With no in-bound cut at all (a single pathological token) take the
    // earliest one so subdivision still makes progress.
    best.or(fallback).map_or(0, |(k, _)| k)
}

/// Step 4, left edge: the pad reaches back to the end of the last silence
/// before `start`, capped, and never into the previous segment's body. A
/// start already inside silence needs no pad.
fn pad_before(start: u64, silences: &SilenceMap, cap: u64, prev_end: Option<u64>) -> u64 {
    if silences
        .spans()
        .iter()
        .any(|&(s, e)| s <= start && start < e)
    {
        return 0;
    }
    let Some(silence_end) = silences
        .spans()
        .iter()
        .rev()
        .find(|&&(_, e)| e <= start)
        .map(|&(_, e)| e)
    else {
        return 0;
    };

    let mut new_start = start.saturating_sub(cap).max(silence_end);
    if let Some(prev_end) = prev_end {
        new_start = new_start.max(prev_end);
    }
    start.saturating_sub(new_start)
}

/// Step 4, right edge: the pad reaches forward to the start of the next
/// silence, capped, never into the next segment's body.
fn pad_after(end: u64, silences: &SilenceMap, cap: u64, next_start: Option<u64>) -> u64 {
    if silences.spans().iter().any(|&(s, e)| s <= end && end < e) {
        return 0;
    }
    let Some(silence_start) = silences
        .spans()
        .iter()
        .find(|&&(s, _)| s >= end)
        .map(|&(s, _)| s)
    else {
        return 0;
    };

    let mut new_end = (end + cap).min(silence_start);
    if let Some(next_start) = next_start {
        new_end = new_end.min(next_start.max(end));
    }
    new_end.saturating_sub(end)
}

/// Step 7: which segments' bodies intersect any other segment's body.
fn mark_overlaps(segments: &[Segment]) -> Vec<bool> {
    let mut overlapping = vec![false; segments.len()];
    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            if segments[i].main.overlaps(&segments[j].main) {
                overlapping[i] = true;
                overlapping[j] = true;
            }
        }
    }
    overlapping
}
