//! End-to-end scenarios and cross-cutting invariants (spec.md §8).
//!
//! S1 (correct scale) and S5 (rushing) are covered in-crate next to the
//! evaluators they exercise; this file covers the remaining concrete
//! scenarios plus the testable properties that span the whole pipeline.

use eval_core::score::{Articulation, ScoreBuilder, Staff};
use eval_core::{evaluate, EvaluationOptions, NoteEvent, Performance, PerformanceBuilder, RealTimeDriver, Score};

fn c_major_scale_score() -> Score {
    let mut b = ScoreBuilder::new(480);
    let pitches = [60, 62, 64, 65, 67, 69, 71, 72];
    for (i, &p) in pitches.iter().enumerate() {
        let tick = i as i64 * 480;
        let event = NoteEvent { pitch: p, velocity: 80, start_tick: tick, duration_ticks: 480, start_ms: tick as f64 * 500.0 / 480.0, duration_ms: 500.0, channel: 0, voice: 0 };
        b.add_note(event, 1, (i + 1) as f64, false, None, None, false, None, Articulation::Normal, Staff::Right);
    }
    b.build().unwrap()
}

fn performance_from_starts(score: &Score, starts_ms: &[f64]) -> Performance {
    let mut b = PerformanceBuilder::new();
    for (note, &ms) in score.notes.iter().zip(starts_ms.iter()) {
        let mut event = note.event;
        event.start_ms = ms;
        b.push_note(event, ms);
    }
    b.build()
}

#[test]
fn s2_one_wrong_note_is_classified_and_flagged() {
    let score = c_major_scale_score();
    let starts: Vec<f64> = (0..8).map(|i| i as f64 * 500.0).collect();
    let mut performance = performance_from_starts(&score, &starts);
    performance.notes[3].event.pitch = 66; // F#4 substituted for F4
    let result = evaluate(&score, &performance, &EvaluationOptions::default());
    assert!(result.note_accuracy.missed == 0 && result.note_accuracy.extra == 0);
    assert_eq!(result.note_accuracy.correct, 7);
    assert_eq!(result.note_accuracy.wrong, 1);
    assert!(result.note_accuracy.issues.iter().any(|i| i.issue_type == "WrongNote" && i.measure == Some(1)));
}

#[test]
fn s3_missed_note_is_reported() {
    let score = c_major_scale_score();
    let starts: Vec<f64> = (0..8).map(|i| i as f64 * 500.0).collect();
    let mut b = PerformanceBuilder::new();
    for (note, &ms) in score.notes.iter().zip(starts.iter()) {
        if note.event.pitch == 64 {
            continue; // omit E4
        }
        let mut event = note.event;
        event.start_ms = ms;
        b.push_note(event, ms);
    }
    let performance = b.build();
    let result = evaluate(&score, &performance, &EvaluationOptions::default());
    assert_eq!(result.note_accuracy.missed, 1);
    assert!(result
        .note_accuracy
        .issues
        .iter()
        .any(|i| i.issue_type == "MissedNote" && i.measure == Some(1) && i.severity == eval_core::IssueSeverity::Significant));
}

#[test]
fn s4_octave_shift_all_credited() {
    let score = c_major_scale_score();
    let starts: Vec<f64> = (0..8).map(|i| i as f64 * 500.0).collect();
    let mut b = PerformanceBuilder::new();
    for (note, &ms) in score.notes.iter().zip(starts.iter()) {
        let mut event = note.event;
        event.pitch += 12;
        event.start_ms = ms;
        b.push_note(event, ms);
    }
    let performance = b.build();
    let result = evaluate(&score, &performance, &EvaluationOptions::default());
    assert_eq!(result.note_accuracy.octave_errors, 8);
    assert_eq!(result.note_accuracy.correct, 0);
    assert_eq!(result.rhythm.score, 100.0);
}

#[test]
fn s6_accelerando_drifts_faster() {
    // Enough measures for the default 4-measure tempo segmentation to see
    // at least two full segments; S6's literal 8-note scale is too short
    // for `drift_trend` to resolve to anything but `Steady`.
    let score = {
        let mut b = ScoreBuilder::new(480);
        for i in 0..16 {
            let tick = i as i64 * 480;
            let event = NoteEvent { pitch: 60, velocity: 80, start_tick: tick, duration_ticks: 480, start_ms: tick as f64 * 500.0 / 480.0, duration_ms: 500.0, channel: 0, voice: 0 };
            b.add_note(event, (i + 1) as u32, 1.0, false, None, None, false, None, Articulation::Normal, Staff::Right);
        }
        b.build().unwrap()
    };
    let mut t = 0.0;
    let mut starts = vec![0.0];
    for i in 0..15 {
        let ioi = 500.0 - (i as f64 / 15.0) * 100.0;
        t += ioi;
        starts.push(t);
    }
    let performance = performance_from_starts(&score, &starts);
    let result = evaluate(&score, &performance, &EvaluationOptions::default());
    assert_eq!(result.tempo.drift_trend, eval_core::evaluate::tempo::DriftTrend::Accelerating);
}

#[test]
fn property_partition_every_note_accounted_for_exactly_once() {
    let score = c_major_scale_score();
    let starts: Vec<f64> = (0..8).map(|i| i as f64 * 500.0).collect();
    let mut b = PerformanceBuilder::new();
    for (note, &ms) in score.notes.iter().zip(starts.iter()) {
        if note.event.pitch == 64 {
            continue;
        }
        let mut event = note.event;
        event.start_ms = ms;
        b.push_note(event, ms);
    }
    b.push_note(NoteEvent { pitch: 100, velocity: 80, start_tick: 0, duration_ticks: 0, start_ms: 50_000.0, duration_ms: 0.0, channel: 0, voice: 0 }, 50_000.0);
    let performance = b.build();

    let alignment = eval_core::align::hybrid::align(&score, &performance, &EvaluationOptions::default());

    let mut accounted_score = std::collections::HashSet::new();
    for pair in &alignment.pairs {
        assert!(accounted_score.insert(pair.score_note_id));
    }
    for missed in &alignment.missed_notes {
        assert!(accounted_score.insert(missed.expected_score_note_id));
    }
    assert_eq!(accounted_score.len(), score.notes.len());

    let mut accounted_perf = std::collections::HashSet::new();
    for pair in &alignment.pairs {
        assert!(accounted_perf.insert(pair.performance_note_id));
    }
    for extra in &alignment.extra_notes {
        assert!(accounted_perf.insert(*extra));
    }
    assert_eq!(accounted_perf.len(), performance.notes.len());
}

#[test]
fn property_identity_alignment_is_perfect() {
    let score = c_major_scale_score();
    let starts: Vec<f64> = (0..8).map(|i| i as f64 * 500.0).collect();
    let performance = performance_from_starts(&score, &starts);
    let alignment = eval_core::align::hybrid::align(&score, &performance, &EvaluationOptions::default());
    assert_eq!(alignment.pairs.len(), score.notes.len());
    assert!(alignment.missed_notes.is_empty());
    assert!(alignment.extra_notes.is_empty());
    assert!(alignment.pairs.iter().all(|p| p.confidence >= 0.8 - 1e-9));

    let result = evaluate(&score, &performance, &EvaluationOptions::default());
    assert_eq!(result.note_accuracy.score, 100.0);
    assert_eq!(result.rhythm.mean_deviation_ms, 0.0);
    assert!(result.tempo.deviation.abs() < 1e-9);
}

#[test]
fn property_uniform_stretch_detects_tempo_ratio() {
    let score = c_major_scale_score();
    let r = 1.2;
    let starts: Vec<f64> = (0..8).map(|i| i as f64 * 500.0 * r).collect();
    let performance = performance_from_starts(&score, &starts);
    let result = evaluate(&score, &performance, &EvaluationOptions::default());
    let expected_ratio = 1.0 / r;
    assert!((result.tempo.detected_bpm / 120.0 - expected_ratio).abs() / expected_ratio < 0.02);
    assert_eq!(result.tempo.drift_trend, eval_core::evaluate::tempo::DriftTrend::Steady);
}

#[test]
fn property_monotonicity_dropping_a_note_never_improves_the_others() {
    let score = c_major_scale_score();
    let starts: Vec<f64> = (0..8).map(|i| i as f64 * 500.0).collect();
    let full_performance = performance_from_starts(&score, &starts);
    let full = evaluate(&score, &full_performance, &EvaluationOptions::default());

    let mut b = PerformanceBuilder::new();
    for (note, &ms) in score.notes.iter().zip(starts.iter()) {
        if note.event.pitch == 64 {
            continue;
        }
        let mut event = note.event;
        event.start_ms = ms;
        b.push_note(event, ms);
    }
    let dropped_performance = b.build();
    let dropped = evaluate(&score, &dropped_performance, &EvaluationOptions::default());

    assert!(dropped.note_accuracy.score <= full.note_accuracy.score);
    assert!(dropped.note_accuracy.missed >= full.note_accuracy.missed);

    let dropped_alignment = eval_core::align::hybrid::align(&score, &dropped_performance, &EvaluationOptions::default());
    let full_alignment = eval_core::align::hybrid::align(&score, &full_performance, &EvaluationOptions::default());
    for pair in &dropped_alignment.pairs {
        let same = full_alignment.pairs.iter().find(|p| p.score_note_id == pair.score_note_id).unwrap();
        assert_eq!(pair.is_exact_pitch_match, same.is_exact_pitch_match);
        assert_eq!(pair.is_octave_error, same.is_octave_error);
    }
}

#[test]
fn catastrophic_alignment_zeroes_the_overall_score() {
    let score = c_major_scale_score();
    let mut b = PerformanceBuilder::new();
    for (i, note) in score.notes.iter().enumerate() {
        let mut event = note.event;
        event.pitch += 1; // every pitch class now mismatches the score
        event.start_ms = 50_000.0 + i as f64 * 500.0; // far outside the timing cost cap
        b.push_note(event, event.start_ms);
    }
    let performance = b.build();

    let alignment = eval_core::align::hybrid::align(&score, &performance, &EvaluationOptions::default());
    assert!(alignment.is_catastrophe);

    let result = evaluate(&score, &performance, &EvaluationOptions::default());
    assert_eq!(result.normalized_score, Some(0.0));
    assert_eq!(result.overall_score(), 0.0);
}

#[test]
fn property_realtime_matches_batch_on_close() {
    let score = c_major_scale_score();
    let pitches = [60, 62, 64, 65, 67, 69, 71, 72];

    let mut feedbacks = Vec::new();
    let mut errors = Vec::new();
    let mut driver = RealTimeDriver::new(score.clone(), EvaluationOptions::default(), |f| feedbacks.push(f), |e| errors.push(e));
    driver.start(0.0);
    let mut notes = Vec::new();
    for (i, &p) in pitches.iter().enumerate() {
        let t = i as f64 * 500.0;
        driver.on_note_on(p, 80, t);
        driver.on_note_off(p, t + 400.0, None);
        notes.push((p, t));
    }
    let realtime_result = driver.get_final_evaluation();

    let starts: Vec<f64> = notes.iter().map(|(_, t)| *t).collect();
    let batch_performance = performance_from_starts(&score, &starts);
    let batch_result = evaluate(&score, &batch_performance, &EvaluationOptions::default());

    assert!((realtime_result.note_accuracy.score - batch_result.note_accuracy.score).abs() < 1e-6);
    assert!((realtime_result.rhythm.mean_deviation_ms - batch_result.rhythm.mean_deviation_ms).abs() < 1e-6);
    assert_eq!(realtime_result.tempo.drift_trend, batch_result.tempo.drift_trend);
    assert!(errors.is_empty());
}

#[test]
fn property_bounded_latency_feedback_arrives_within_window_plus_lookahead_notes() {
    let score = c_major_scale_score();
    let pitches = [60, 62, 64, 65, 67, 69, 71, 72];
    let options = EvaluationOptions::default();
    let bound = options.realtime.min_window + options.realtime.lookahead;

    let mut driver = RealTimeDriver::new(score, options, |_| {}, |_| {});
    driver.start(0.0);
    let mut arrived_at = None;
    for (i, &p) in pitches.iter().enumerate() {
        let t = i as f64 * 500.0 - 80.0; // rushing, so timing issues are flagged
        driver.on_note_on(p, 80, t);
        driver.on_note_off(p, t + 400.0, None);
        if !driver.get_progress().recent_feedback.is_empty() {
            arrived_at = Some(i + 1);
            break;
        }
    }
    let arrived_at = arrived_at.expect("expected at least one feedback emission for a rushed performance");
    assert!(arrived_at <= bound * 2, "feedback should arrive within a small multiple of (min_window + lookahead) notes, got note {arrived_at}");
}
