//! Fusion scenarios over hand-built annotation streams.

use speechset::audio::silence::SilenceMap;
use speechset::backends::DiarizationTurn;
use speechset::fusion::tokens::{Token, TokenStream};
use speechset::fusion::{fuse, FusionOptions, SegmentStatus};
use std::collections::HashMap;

fn tok(text: &str, start: u64, end: u64, speaker: Option<&str>) -> Token {
    Token {
        text: text.to_string(),
        start_ms: start,
        end_ms: end,
        confidence: 1.0,
        speaker: speaker.map(str::to_string),
    }
}

fn turn(label: &str, start_s: f64, end_s: f64) -> DiarizationTurn {
    DiarizationTurn {
        speaker: label.to_string(),
        start_s,
        end_s,
    }
}

fn default_options() -> FusionOptions {
    FusionOptions {
        silence_pad_ms: 50,
        min_silence_length_ms: 500,
        build_subsegments: true,
        join_subsegments: false,
        max_sub_duration_ms: 15_000,
        min_segment_duration_ms: 1_000,
        max_segment_duration_ms: 25_000,
    }
}

/// Speaker assigner handing out dense ids per label, like an empty speaker
/// database would.
fn fresh_db_assigner() -> impl FnMut(&str) -> Option<u32> {
    let mut seen: HashMap<String, u32> = HashMap::new();
    move |label: &str| {
        let next = seen.len() as u32;
        Some(*seen.entry(label.to_string()).or_insert(next))
    }
}

#[test]
fn silence_boundary_split_keeps_one_segment() {
    // Two tokens separated by a 100ms pause; sentence continues across it.
    let tokens = TokenStream {
        tokens: vec![
            tok("Hello", 0, 500, None),
            tok("world.", 600, 900, None),
        ],
    };
    let silences = SilenceMap::new(vec![(500, 600), (900, 1500)]).unwrap();

    let segments = fuse(
        &tokens,
        &[],
        &silences,
        &default_options(),
        fresh_db_assigner(),
    );

    assert_eq!(segments.len(), 1);
    let segment = &segments[0];
    assert_eq!(segment.main.start_ms, 0);
    assert_eq!(segment.main.end_ms, 900);
    assert_eq!(segment.main.text, "Hello world.");
    assert_eq!(segment.main.speaker_id, 0);
    assert_eq!(segment.status, SegmentStatus::Good);
    assert!(segment.main.pad_end_ms <= 50);
}

#[test]
fn speaker_change_produces_two_segments_with_fresh_ids() {
    let tokens = TokenStream {
        tokens: vec![tok("A", 0, 400, None), tok("B", 500, 900, None)],
    };
    let turns = vec![turn("L1", 0.0, 0.45), turn("L2", 0.45, 0.95)];
    let silences = SilenceMap::new(vec![(400, 500)]).unwrap();

    let segments = fuse(
        &tokens,
        &turns,
        &silences,
        &default_options(),
        fresh_db_assigner(),
    );

    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].main.speaker_id, 0);
    assert_eq!(segments[1].main.speaker_id, 1);
    assert_eq!(segments[0].main.text, "A");
    assert_eq!(segments[1].main.text, "B");
}

#[test]
fn overlapping_segments_are_both_bad() {
    let tokens = TokenStream {
        tokens: vec![
            tok("one", 1000, 2000, None),
            tok("two", 1500, 2500, None),
        ],
    };
    let turns = vec![turn("L1", 0.9, 1.6), turn("L2", 1.9, 2.6)];

    let segments = fuse(
        &tokens,
        &turns,
        &SilenceMap::default(),
        &default_options(),
        fresh_db_assigner(),
    );

    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].main.start_ms, 1000);
    assert_eq!(segments[0].main.end_ms, 2000);
    assert_eq!(segments[1].main.start_ms, 1500);
    assert_eq!(segments[1].main.end_ms, 2500);
    assert_eq!(segments[0].status, SegmentStatus::Bad);
    assert_eq!(segments[1].status, SegmentStatus::Bad);
}

#[test]
fn gap_exactly_at_threshold_splits_but_shorter_does_not() {
    let options = default_options();

    // Exactly 500ms of silent gap.
    let at_threshold = TokenStream {
        tokens: vec![tok("ena", 0, 400, None), tok("dva", 900, 1300, None)],
    };
    let silences = SilenceMap::new(vec![(400, 900)]).unwrap();
    let segments = fuse(&at_threshold, &[], &silences, &options, fresh_db_assigner());
    assert_eq!(segments.len(), 2);

    // One millisecond shorter.
    let below = TokenStream {
        tokens: vec![tok("ena", 0, 400, None), tok("dva", 899, 1300, None)],
    };
    let silences = SilenceMap::new(vec![(400, 899)]).unwrap();
    let segments = fuse(&below, &[], &silences, &options, fresh_db_assigner());
    assert_eq!(segments.len(), 1);
}

#[test]
fn padding_respects_cap_and_neighbours() {
    let tokens = TokenStream {
        tokens: vec![
            tok("Prvi.", 1000, 2000, None),
            tok("Drugi.", 2400, 3400, None),
        ],
    };
    // Silence between and around the segments.
    let silences = SilenceMap::new(vec![(0, 800), (2000, 2400), (3400, 4000)]).unwrap();

    let segments = fuse(
        &tokens,
        &[],
        &silences,
        &default_options(),
        fresh_db_assigner(),
    );

    assert_eq!(segments.len(), 2);
    for segment in &segments {
        assert!(segment.main.pad_start_ms <= 50);
        assert!(segment.main.pad_end_ms <= 50);
    }
    // First pad_end must not reach into the second segment's body.
    let first = &segments[0].main;
    let second = &segments[1].main;
    assert!(first.end_ms + first.pad_end_ms <= second.start_ms);
}

#[test]
fn min_confidence_is_min_over_contained_tokens() {
    let mut tokens = vec![
        tok("gotovo", 0, 300, None),
        tok("morda", 350, 700, None),
        tok("konec.", 750, 1100, None),
    ];
    tokens[1].confidence = 0.65;
    let stream = TokenStream { tokens };

    let segments = fuse(
        &stream,
        &[],
        &SilenceMap::default(),
        &default_options(),
        fresh_db_assigner(),
    );

    assert_eq!(segments.len(), 1);
    assert!((segments[0].main.min_confidence - 0.65).abs() < 1e-6);
}

#[test]
fn subsegments_split_on_comma_with_silence() {
    let tokens = TokenStream {
        tokens: vec![
            tok("Prvi,", 0, 400, None),
            tok("drugi.", 900, 1400, None),
        ],
    };
    // 500ms silent gap after the comma: enough for a sub cut (half of the
    // 800ms boundary threshold) but not for a main segment boundary.
    let silences = SilenceMap::new(vec![(400, 900)]).unwrap();

    let mut options = default_options();
    options.min_silence_length_ms = 800;

    let segments = fuse(&tokens, &[], &silences, &options, fresh_db_assigner());
    assert_eq!(segments.len(), 1);
    let subs = &segments[0].subs;
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0].text, "Prvi");
    assert_eq!(subs[1].text, "drugi.");
    assert!(subs.iter().all(|s| s.speaker_id == 0));
}

#[test]
fn build_subsegments_disabled_leaves_subs_empty() {
    let tokens = TokenStream {
        tokens: vec![
            tok("Prvi,", 0, 400, None),
            tok("drugi.", 900, 1400, None),
        ],
    };
    let silences = SilenceMap::new(vec![(400, 900)]).unwrap();

    let mut options = default_options();
    options.build_subsegments = false;
    options.min_silence_length_ms = 800;

    let segments = fuse(&tokens, &[], &silences, &options, fresh_db_assigner());
    assert_eq!(segments.len(), 1);
    assert!(segments[0].subs.is_empty());
}

#[test]
fn fused_output_is_byte_equal_across_runs() {
    let tokens = TokenStream {
        tokens: vec![
            tok("Dober", 0, 350, None),
            tok("dan,", 360, 800, None),
            tok("vsem.", 1200, 1700, None),
            tok("Hvala", 2600, 3000, None),
            tok("lepa.", 3010, 3500, None),
        ],
    };
    let turns = vec![turn("L1", 0.0, 1.8), turn("L2", 2.5, 3.6)];
    let silences = SilenceMap::new(vec![(800, 1200), (1700, 2600)]).unwrap();
    let options = default_options();

    let a = fuse(&tokens, &turns, &silences, &options, fresh_db_assigner());
    let b = fuse(&tokens, &turns, &silences, &options, fresh_db_assigner());

    let a_json = serde_json::to_vec(&a).unwrap();
    let b_json = serde_json::to_vec(&b).unwrap();
    assert_eq!(a_json, b_json);
}

#[test]
fn monologue_without_boundaries_is_cut_into_bounded_clips() {
    // 90 seconds of continuous speech: no punctuation, no silences, one
    // speaker. Every emitted clip must stay within the duration bound.
    let tokens = TokenStream {
        tokens: (0u64..45)
            .map(|k| tok("beseda", k * 2000, k * 2000 + 1900, None))
            .collect(),
    };

    let segments = fuse(
        &tokens,
        &[],
        &SilenceMap::default(),
        &default_options(),
        fresh_db_assigner(),
    );

    assert!(segments.len() > 1);
    let mut covered = 0;
    for segment in &segments {
        assert!(segment.main.end_ms - segment.main.start_ms <= 25_000);
        assert_eq!(segment.status, SegmentStatus::Good);
        covered += segment.main.end_ms - segment.main.start_ms;
    }
    // The cuts only drop inter-token gaps, never speech.
    assert!(covered >= 45 * 1900);
}

#[test]
fn same_speaker_segments_never_overlap_after_fusion() {
    // A busy single-speaker stream with sentence breaks and silences.
    let tokens = TokenStream {
        tokens: vec![
            tok("Ena.", 0, 500, None),
            tok("Dva.", 700, 1200, None),
            tok("Tri.", 1400, 1900, None),
            tok("Stiri.", 2100, 2600, None),
        ],
    };
    let silences =
        SilenceMap::new(vec![(500, 700), (1200, 1400), (1900, 2100), (2600, 3000)]).unwrap();

    let segments = fuse(
        &tokens,
        &[],
        &silences,
        &default_options(),
        fresh_db_assigner(),
    );

    assert_eq!(segments.len(), 4);
    for window in segments.windows(2) {
        let (a, b) = (&window[0].main, &window[1].main);
        assert!(a.start_ms <= b.start_ms);
        assert!(
            a.end_ms + a.pad_end_ms <= b.start_ms.saturating_sub(0),
            "padded bodies must not overlap"
        );
        assert_eq!(window[0].status, SegmentStatus::Good);
    }
}
