//! Hybrid aligner: combines DTW's coarse time mapping with per-voice
//! Needleman-Wunsch matching (spec.md §4.5). This is the public entry point
//! the rest of the engine calls.

use std::time::{Duration, Instant};

use crate::config::{AlignerChoice, EvaluationOptions};
use crate::event::NoteEvent;
use crate::performance::{Performance, PerformanceNoteId};
use crate::score::{Score, ScoreNoteId};

use super::cost::combined_cost;
use super::dtw;
use super::nw::{self, NwOp};
use super::{AlignedNotePair, AlignmentResult, MissedNote, MissedReason};

/// Voice classification by pitch range, used to seed performance-note voice
/// assignment when the score doesn't resolve it via the `staff` field
/// (spec.md §4.5 step 1). Performance notes carry no staff, so they are
/// bucketed by the same treble/bass split the score's two staves represent;
/// an octave shift of the whole performance must not cross this boundary
/// for anything that started within playable piano range.
fn register_of_pitch(pitch: u8) -> u8 {
    if pitch >= 60 {
        0 // treble, mirrors Staff::Right
    } else {
        1 // bass, mirrors Staff::Left
    }
}

struct IndexedNote {
    index: usize,
    event: NoteEvent,
}

fn partition_score_voices(score: &Score) -> Vec<Vec<IndexedNote>> {
    let mut voices: Vec<Vec<IndexedNote>> = vec![Vec::new(), Vec::new()];
    for (i, note) in score.notes.iter().enumerate() {
        let voice = match note.staff {
            crate::score::Staff::Right => 0,
            crate::score::Staff::Left => 1,
        };
        voices[voice].push(IndexedNote { index: i, event: note.event });
    }
    voices
}

fn partition_performance_voices(notes: &[NoteEvent]) -> Vec<Vec<IndexedNote>> {
    let mut voices: Vec<Vec<IndexedNote>> = vec![Vec::new(), Vec::new()];
    for (i, event) in notes.iter().enumerate() {
        voices[register_of_pitch(event.pitch) as usize].push(IndexedNote { index: i, event: *event });
    }
    voices
}

/// Align a score against a performance, producing a full [`AlignmentResult`].
#[must_use]
pub fn align(score: &Score, performance: &Performance, options: &EvaluationOptions) -> AlignmentResult {
    let start = Instant::now();

    if score.notes.is_empty() || performance.notes.is_empty() {
        let mut result = AlignmentResult::trivial();
        result.missed_notes = score
            .notes
            .iter()
            .map(|n| MissedNote { expected_score_note_id: n.id, substituted_by: None, inferred_reason: MissedReason::Unknown })
            .collect();
        result.extra_notes = performance.notes.iter().map(|n| n.id).collect();
        result.compute_time = start.elapsed();
        return result;
    }

    let score_events: Vec<NoteEvent> = score.notes.iter().map(|n| n.event).collect();
    let perf_events: Vec<NoteEvent> = performance.notes.iter().map(|n| n.event).collect();

    // Step 2: coarse time mapping via DTW over the whole sequences.
    let band = options.effective_band_width(perf_events.len());
    let dtw_result = dtw::align(&score_events, &perf_events, options.cost_weights.timing, options.timing_cost_cap_ms, band);
    let (tempo_ratio, time_offset_ms, average_cost) = dtw_result
        .as_ref()
        .map(|r| (r.estimated_tempo_ratio, r.time_offset_ms, r.average_cost))
        .unwrap_or((1.0, 0.0, 0.0));
    let warping_path = dtw_result.map(|r| r.warping_path).unwrap_or_default();
    let is_catastrophe = average_cost > options.catastrophe_threshold;

    // Map every performance time into score-time: score_time ~= (perf_time - offset) / tempo_ratio.
    let mapped_perf_events: Vec<NoteEvent> = perf_events
        .iter()
        .map(|e| {
            let mut mapped = *e;
            mapped.start_ms = (e.start_ms - time_offset_ms) / tempo_ratio.max(1e-9);
            mapped
        })
        .collect();

    if options.aligner == AlignerChoice::Dtw {
        // DTW-only mode: turn the warping path directly into pairs.
        return dtw_only_result(score, performance, &warping_path, tempo_ratio, time_offset_ms, is_catastrophe, start.elapsed());
    }

    // Step 1 & 3: per-voice NW matching over time-mapped events.
    let score_voices = partition_score_voices(score);
    let perf_voices = partition_performance_voices(&mapped_perf_events);

    struct VoicePairCandidate {
        score_note_id: ScoreNoteId,
        performance_note_id: PerformanceNoteId,
        cost: f64,
    }
    let mut candidates: Vec<VoicePairCandidate> = Vec::new();
    let mut missed: Vec<MissedNote> = Vec::new();
    let mut extra_in_voice: Vec<PerformanceNoteId> = Vec::new();

    for (score_voice, perf_voice) in score_voices.iter().zip(perf_voices.iter()) {
        let s_events: Vec<NoteEvent> = score_voice.iter().map(|n| n.event).collect();
        let p_events: Vec<NoteEvent> = perf_voice.iter().map(|n| n.event).collect();
        let ops = nw::align(&s_events, &p_events, options.gap_penalty, options.cost_weights, options.timing_cost_cap_ms);
        for op in ops {
            match op {
                NwOp::Pair(si, pi) => {
                    let score_idx = score_voice[si].index;
                    let perf_idx = perf_voice[pi].index;
                    let cost = combined_cost(&score_events[score_idx], &perf_events[perf_idx], options.cost_weights, options.timing_cost_cap_ms);
                    candidates.push(VoicePairCandidate {
                        score_note_id: score.notes[score_idx].id,
                        performance_note_id: performance.notes[perf_idx].id,
                        cost,
                    });
                }
                NwOp::GapInPerformance(si) => {
                    let score_idx = score_voice[si].index;
                    missed.push(MissedNote {
                        expected_score_note_id: score.notes[score_idx].id,
                        substituted_by: None,
                        inferred_reason: MissedReason::Skipped,
                    });
                }
                NwOp::GapInScore(pi) => {
                    let perf_idx = perf_voice[pi].index;
                    extra_in_voice.push(performance.notes[perf_idx].id);
                }
            }
        }
    }

    // Step 4: merge. A performance note matched in more than one voice is
    // retained only in its lowest-cost pairing; other matches become extras.
    use std::collections::HashMap;
    let mut best_for_perf: HashMap<PerformanceNoteId, usize> = HashMap::new();
    for (idx, c) in candidates.iter().enumerate() {
        match best_for_perf.get(&c.performance_note_id) {
            Some(&existing) if candidates[existing].cost <= c.cost => {}
            _ => {
                best_for_perf.insert(c.performance_note_id, idx);
            }
        }
    }
    let mut pairs = Vec::new();
    let mut extra_notes = extra_in_voice;
    for (idx, c) in candidates.iter().enumerate() {
        if best_for_perf.get(&c.performance_note_id) == Some(&idx) {
            let score_note = score.find(c.score_note_id).unwrap();
            let perf_note = performance.find(c.performance_note_id).unwrap();
            pairs.push(build_pair(score, score_note, perf_note));
        } else {
            extra_notes.push(c.performance_note_id);
        }
    }

    // Step 5: grace-note and tuplet relaxation.
    apply_grace_tuplet_relaxation(score, &pairs, &mut missed, options);

    pairs.sort_by_key(|p| p.score_note_id);

    AlignmentResult {
        pairs,
        missed_notes: missed,
        extra_notes,
        warping_path,
        estimated_tempo_ratio: tempo_ratio,
        time_offset_ms,
        algorithm_name: "hybrid",
        compute_time: start.elapsed(),
        is_catastrophe,
    }
}

/// Timing-deviation horizon for confidence decay (spec.md §4.5 step 6):
/// distinct from `timing_cost_cap_ms`, which scales the DTW/NW cost
/// functions instead.
const CONFIDENCE_DECAY_MS: f64 = 200.0;

fn build_pair(
    score: &Score,
    score_note: &crate::score::ScoreNote,
    perf_note: &crate::performance::PerformanceNote,
) -> AlignedNotePair {
    let a = &score_note.event;
    let b = &perf_note.event;
    let pitch_difference = i32::from(b.pitch) - i32::from(a.pitch);
    let is_exact_pitch_match = a.pitch == b.pitch;
    let is_octave_error = !is_exact_pitch_match && pitch_difference.abs() == 12 && a.pitch_class() == b.pitch_class();
    let timing_deviation_ms = b.start_ms - a.start_ms;
    let timing_deviation_beats = timing_deviation_ms / (60_000.0 / score.tempo_map().bpm_at(a.start_tick));

    let confidence_base = if is_exact_pitch_match {
        0.8
    } else if is_octave_error {
        0.5
    } else {
        0.2
    };
    let confidence = confidence_base * (1.0 - timing_deviation_ms.abs() / CONFIDENCE_DECAY_MS).max(0.0);

    AlignedNotePair {
        score_note_id: score_note.id,
        performance_note_id: perf_note.id,
        confidence,
        timing_deviation_ms,
        timing_deviation_beats,
        pitch_difference,
        velocity_difference: i32::from(b.velocity) - i32::from(a.velocity),
        is_exact_pitch_match,
        is_octave_error,
    }
}

fn apply_grace_tuplet_relaxation(
    score: &Score,
    pairs: &[AlignedNotePair],
    missed: &mut [MissedNote],
    options: &EvaluationOptions,
) {
    use std::collections::HashSet;
    let matched: HashSet<ScoreNoteId> = pairs.iter().map(|p| p.score_note_id).collect();
    for m in missed.iter_mut() {
        let Some(note) = score.find(m.expected_score_note_id) else { continue };
        if note.is_grace_note {
            if let Some(parent_id) = note.parent_note_id {
                if let Some(parent_pair) = pairs.iter().find(|p| p.score_note_id == parent_id) {
                    if parent_pair.timing_deviation_ms.abs() <= options.grace_tolerance_ms {
                        m.inferred_reason = MissedReason::OptionalOrnament;
                    }
                }
            }
        } else if note.is_tuplet {
            // Missed tuplet notes whose sibling group has >= 2 matched
            // members keep missed status; the note-accuracy evaluator
            // applies a softened penalty for these (spec.md §4.5 step 5).
            if let Some(info) = note.tuplet_info {
                let siblings_matched = score
                    .notes
                    .iter()
                    .filter(|n| n.is_tuplet && n.tuplet_info.map(|i| i.group_size) == Some(info.group_size) && n.measure == note.measure)
                    .filter(|n| matched.contains(&n.id))
                    .count();
                if siblings_matched >= 2 {
                    m.inferred_reason = MissedReason::TimingMismatch;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn dtw_only_result(
    score: &Score,
    performance: &Performance,
    warping_path: &[(usize, usize)],
    tempo_ratio: f64,
    time_offset_ms: f64,
    is_catastrophe: bool,
    compute_time: Duration,
) -> AlignmentResult {
    use std::collections::HashSet;
    let mut pairs = Vec::new();
    let mut matched_score: HashSet<ScoreNoteId> = HashSet::new();
    let mut matched_perf: HashSet<PerformanceNoteId> = HashSet::new();
    for &(si, pi) in warping_path {
        let score_note = &score.notes[si];
        let perf_note = &performance.notes[pi];
        if matched_score.contains(&score_note.id) || matched_perf.contains(&perf_note.id) {
            continue;
        }
        matched_score.insert(score_note.id);
        matched_perf.insert(perf_note.id);
        pairs.push(build_pair(score, score_note, perf_note));
    }
    let missed_notes = score
        .notes
        .iter()
        .filter(|n| !matched_score.contains(&n.id))
        .map(|n| MissedNote { expected_score_note_id: n.id, substituted_by: None, inferred_reason: MissedReason::Unknown })
        .collect();
    let extra_notes = performance.notes.iter().filter(|n| !matched_perf.contains(&n.id)).map(|n| n.id).collect();

    AlignmentResult {
        pairs,
        missed_notes,
        extra_notes,
        warping_path: warping_path.to_vec(),
        estimated_tempo_ratio: tempo_ratio,
        time_offset_ms,
        algorithm_name: "dtw",
        compute_time,
        is_catastrophe,
    }
}
