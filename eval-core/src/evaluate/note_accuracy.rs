//! Note-accuracy evaluator (spec.md §4.6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::align::{AlignmentResult, MissedReason};
use crate::config::EvaluationOptions;
use crate::error::{dedup_issues, Issue, IssueSeverity};
use crate::performance::Performance;
use crate::score::Score;

use super::Evaluator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteClassification {
    Correct,
    OctaveError,
    WrongPitch,
    /// Pitch class identical, spelling differs — treated as correct for scoring.
    EnharmonicMatch,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeasureBreakdown {
    pub measure: u32,
    pub correct: u32,
    pub total: u32,
}

impl MeasureBreakdown {
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            100.0 * f64::from(self.correct) / f64::from(self.total)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteAccuracyResult {
    pub score: f64,
    pub correct: u32,
    pub octave_errors: u32,
    pub wrong: u32,
    pub missed: u32,
    pub extra: u32,
    pub total: u32,
    pub measure_breakdown: Vec<MeasureBreakdown>,
    pub problem_measures: Vec<u32>,
    pub issues: Vec<Issue>,
}

pub struct NoteAccuracyEvaluator;

impl Evaluator for NoteAccuracyEvaluator {
    type Output = NoteAccuracyResult;

    fn name(&self) -> &'static str {
        "note_accuracy"
    }

    fn evaluate(&self, alignment: &AlignmentResult, score: &Score, performance: &Performance, options: &EvaluationOptions) -> NoteAccuracyResult {
        let total = score.notes.len() as u32;
        if total == 0 {
            return NoteAccuracyResult {
                score: 0.0,
                correct: 0,
                octave_errors: 0,
                wrong: 0,
                missed: 0,
                extra: 0,
                total: 0,
                measure_breakdown: Vec::new(),
                problem_measures: Vec::new(),
                issues: vec![Issue::new(IssueSeverity::Info, "EmptyScore", "score has no notes to evaluate")],
            };
        }

        let weights = options.accuracy_weights;
        let mut correct = 0u32;
        let mut octave_errors = 0u32;
        let mut wrong = 0u32;
        let mut issues = Vec::new();
        let mut per_measure: HashMap<u32, (u32, u32)> = HashMap::new();

        for pair in &alignment.pairs {
            let Some(score_note) = score.find(pair.score_note_id) else { continue };
            let entry = per_measure.entry(score_note.measure).or_insert((0, 0));
            entry.1 += 1;

            let classification = classify_pair(pair);
            match classification {
                NoteClassification::Correct | NoteClassification::EnharmonicMatch => {
                    correct += 1;
                    entry.0 += 1;
                }
                NoteClassification::OctaveError => {
                    octave_errors += 1;
                    entry.0 += 1;
                    issues.push(
                        Issue::new(IssueSeverity::Minor, "OctaveError", format!("played an octave away from expected {}", score_note.event.note_name()))
                            .with_measure(score_note.measure)
                            .with_beat(score_note.beat)
                            .with_score_note(score_note.id.0)
                            .with_performance_note(pair.performance_note_id.0),
                    );
                }
                NoteClassification::WrongPitch => {
                    wrong += 1;
                    issues.push(
                        Issue::new(IssueSeverity::Moderate, "WrongNote", format!("expected {}", score_note.event.note_name()))
                            .with_measure(score_note.measure)
                            .with_beat(score_note.beat)
                            .with_score_note(score_note.id.0)
                            .with_performance_note(pair.performance_note_id.0),
                    );
                }
            }
        }

        for missed in &alignment.missed_notes {
            let Some(score_note) = score.find(missed.expected_score_note_id) else { continue };
            per_measure.entry(score_note.measure).or_insert((0, 0)).1 += 1;
            if missed.inferred_reason == MissedReason::OptionalOrnament {
                continue;
            }
            let severity = if score_note.is_grace_note { IssueSeverity::Minor } else { IssueSeverity::Significant };
            issues.push(
                Issue::new(severity, "MissedNote", format!("expected {} was not played", score_note.event.note_name()))
                    .with_measure(score_note.measure)
                    .with_beat(score_note.beat)
                    .with_score_note(score_note.id.0),
            );
        }
        let missed = alignment.missed_notes.iter().filter(|m| m.inferred_reason != MissedReason::OptionalOrnament).count() as u32;

        let mut extra = 0u32;
        for extra_id in &alignment.extra_notes {
            let Some(note) = performance.find(*extra_id) else { continue };
            if note.event.velocity > options.extra_note_velocity_threshold && note.event.duration_ms > options.extra_note_duration_threshold_ms {
                extra += 1;
                issues.push(
                    Issue::new(IssueSeverity::Minor, "ExtraNote", format!("played unexpected {}", note.event.note_name()))
                        .with_performance_note(note.id.0),
                );
            }
        }

        let raw_score = 100.0 * f64::from(correct) / f64::from(total) - f64::from(wrong) * weights.wrong
            - f64::from(octave_errors) * weights.octave
            + f64::from(octave_errors) * weights.octave_credit * (100.0 / f64::from(total))
            - f64::from(missed) * weights.missed
            - f64::from(extra) * weights.extra;
        let score_value = raw_score.clamp(0.0, 100.0);

        let mut measure_breakdown: Vec<MeasureBreakdown> = per_measure
            .into_iter()
            .map(|(measure, (c, t))| MeasureBreakdown { measure, correct: c, total: t })
            .collect();
        measure_breakdown.sort_by_key(|m| m.measure);

        let mut by_accuracy = measure_breakdown.clone();
        by_accuracy.sort_by(|a, b| a.accuracy().partial_cmp(&b.accuracy()).unwrap());
        let problem_measures: Vec<u32> = by_accuracy.iter().take(5).map(|m| m.measure).collect();

        NoteAccuracyResult {
            score: score_value,
            correct,
            octave_errors,
            wrong,
            missed,
            extra,
            total,
            measure_breakdown,
            problem_measures,
            issues: dedup_issues(issues),
        }
    }
}

fn classify_pair(pair: &crate::align::AlignedNotePair) -> NoteClassification {
    if pair.is_exact_pitch_match {
        NoteClassification::Correct
    } else if pair.is_octave_error {
        NoteClassification::OctaveError
    } else if pair.pitch_difference == 0 {
        NoteClassification::EnharmonicMatch
    } else {
        NoteClassification::WrongPitch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::AlignedNotePair;
    use crate::performance::PerformanceNoteId;
    use crate::score::ScoreNoteId;

    fn pair(score_id: u64, perf_id: u64, pitch_difference: i32, is_octave_error: bool) -> AlignedNotePair {
        AlignedNotePair {
            score_note_id: ScoreNoteId(score_id),
            performance_note_id: PerformanceNoteId(perf_id),
            confidence: 0.9,
            timing_deviation_ms: 0.0,
            timing_deviation_beats: 0.0,
            pitch_difference,
            velocity_difference: 0,
            is_exact_pitch_match: pitch_difference == 0,
            is_octave_error,
        }
    }

    #[test]
    fn classification_matches_spec_rules() {
        assert_eq!(classify_pair(&pair(1, 1, 0, false)), NoteClassification::Correct);
        assert_eq!(classify_pair(&pair(1, 1, 12, true)), NoteClassification::OctaveError);
        assert_eq!(classify_pair(&pair(1, 1, 1, false)), NoteClassification::WrongPitch);
    }

    #[test]
    fn missed_notes_reduce_score_but_never_panic_on_empty() {
        let score = crate::score::ScoreBuilder::new(480).build().unwrap();
        let performance = Performance { notes: vec![], sustain_events: vec![], soft_events: vec![], sostenuto_events: vec![] };
        let alignment = crate::align::AlignmentResult::trivial();
        let result = NoteAccuracyEvaluator.evaluate(&alignment, &score, &performance, &EvaluationOptions::default());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.total, 0);
    }
}
