//! Rhythm evaluator (spec.md §4.7).

use serde::{Deserialize, Serialize};

use crate::align::AlignmentResult;
use crate::config::EvaluationOptions;
use crate::error::{dedup_issues, Issue, IssueSeverity};
use crate::performance::Performance;
use crate::score::Score;

use super::Evaluator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingSeverity {
    OnTime,
    SlightlyEarly,
    SlightlyLate,
    VeryEarly,
    VeryLate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteTimingReport {
    pub score_note_id: u64,
    pub deviation_ms: f64,
    pub severity: TimingSeverity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemicIssue {
    Rushing,
    Dragging,
    Uneven,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RhythmResult {
    pub score: f64,
    pub mean_deviation_ms: f64,
    pub mean_abs_deviation_ms: f64,
    pub std_dev_ms: f64,
    pub per_note: Vec<NoteTimingReport>,
    pub systemic_issues: Vec<SystemicIssue>,
    pub hotspot_measures: Vec<u32>,
    pub issues: Vec<Issue>,
}

pub struct RhythmEvaluator;

impl Evaluator for RhythmEvaluator {
    type Output = RhythmResult;

    fn name(&self) -> &'static str {
        "rhythm"
    }

    fn evaluate(&self, alignment: &AlignmentResult, score: &Score, _performance: &Performance, options: &EvaluationOptions) -> RhythmResult {
        let t = options.rhythm_thresholds;

        if alignment.pairs.is_empty() {
            return RhythmResult {
                score: 0.0,
                mean_deviation_ms: 0.0,
                mean_abs_deviation_ms: 0.0,
                std_dev_ms: 0.0,
                per_note: Vec::new(),
                systemic_issues: Vec::new(),
                hotspot_measures: Vec::new(),
                issues: vec![Issue::new(IssueSeverity::Info, "EmptyStream", "no aligned notes to evaluate rhythm")],
            };
        }

        let mut per_note = Vec::with_capacity(alignment.pairs.len());
        let mut deviations = Vec::with_capacity(alignment.pairs.len());
        let mut issues = Vec::new();
        let mut per_measure_abs: std::collections::HashMap<u32, Vec<f64>> = std::collections::HashMap::new();

        for pair in &alignment.pairs {
            let Some(score_note) = score.find(pair.score_note_id) else { continue };
            let delta = pair.timing_deviation_ms;
            deviations.push(delta);

            let severity = if score_note.is_grace_note || delta.abs() <= t.on_time_ms {
                TimingSeverity::OnTime
            } else if delta < 0.0 {
                if delta.abs() <= t.extreme_ms { TimingSeverity::SlightlyEarly } else { TimingSeverity::VeryEarly }
            } else if delta <= t.extreme_ms {
                TimingSeverity::SlightlyLate
            } else {
                TimingSeverity::VeryLate
            };

            per_measure_abs.entry(score_note.measure).or_default().push(delta.abs());
            per_note.push(NoteTimingReport { score_note_id: score_note.id.0, deviation_ms: delta, severity });

            match severity {
                TimingSeverity::VeryEarly => issues.push(
                    Issue::new(IssueSeverity::Moderate, "RushedNote", format!("played {:.0}ms early", delta.abs()))
                        .with_measure(score_note.measure)
                        .with_beat(score_note.beat)
                        .with_score_note(score_note.id.0),
                ),
                TimingSeverity::VeryLate => issues.push(
                    Issue::new(IssueSeverity::Moderate, "DraggedNote", format!("played {delta:.0}ms late"))
                        .with_measure(score_note.measure)
                        .with_beat(score_note.beat)
                        .with_score_note(score_note.id.0),
                ),
                _ => {}
            }
        }

        let n = deviations.len() as f64;
        let mean_deviation_ms = deviations.iter().sum::<f64>() / n;
        let mean_abs_deviation_ms = deviations.iter().map(|d| d.abs()).sum::<f64>() / n;
        let variance = deviations.iter().map(|d| (d - mean_deviation_ms).powi(2)).sum::<f64>() / n;
        let std_dev_ms = variance.sqrt();

        let mut systemic_issues = Vec::new();
        if mean_deviation_ms < -t.slight_ms {
            systemic_issues.push(SystemicIssue::Rushing);
            issues.push(Issue::new(IssueSeverity::Moderate, "RushedNote", format!("average {mean_deviation_ms:.0}ms early across the performance")));
        } else if mean_deviation_ms > t.slight_ms {
            systemic_issues.push(SystemicIssue::Dragging);
            issues.push(Issue::new(IssueSeverity::Moderate, "DraggedNote", format!("average {mean_deviation_ms:.0}ms late across the performance")));
        }
        if std_dev_ms > t.uneven_stddev_ms {
            systemic_issues.push(SystemicIssue::Uneven);
            issues.push(Issue::new(IssueSeverity::Minor, "Uneven", format!("timing deviation std dev {std_dev_ms:.0}ms")));
        }

        let mut hotspot_measures: Vec<u32> = per_measure_abs
            .iter()
            .filter(|(_, devs)| devs.iter().sum::<f64>() / devs.len() as f64 > t.slight_ms)
            .map(|(&m, _)| m)
            .collect();
        hotspot_measures.sort_unstable();

        let very_early_count = per_note.iter().filter(|n| n.severity == TimingSeverity::VeryEarly).count() as f64;
        let very_late_count = per_note.iter().filter(|n| n.severity == TimingSeverity::VeryLate).count() as f64;
        let raw_score = 100.0 - mean_abs_deviation_ms / 10.0 - std_dev_ms / 15.0 - 0.5 * (very_early_count + very_late_count);

        RhythmResult {
            score: raw_score.clamp(0.0, 100.0),
            mean_deviation_ms,
            mean_abs_deviation_ms,
            std_dev_ms,
            per_note,
            systemic_issues,
            hotspot_measures,
            issues: dedup_issues(issues),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::AlignedNotePair;
    use crate::performance::PerformanceNoteId;
    use crate::score::{Articulation, ScoreBuilder, Staff};

    fn make_score() -> Score {
        let mut b = ScoreBuilder::new(480);
        for i in 0..4 {
            let tick = i as i64 * 480;
            let event = crate::event::NoteEvent { pitch: 60, velocity: 80, start_tick: tick, duration_ticks: 480, start_ms: tick as f64, duration_ms: 480.0, channel: 0, voice: 0 };
            b.add_note(event, 1, (i + 1) as f64, false, None, None, false, None, Articulation::Normal, Staff::Right);
        }
        b.build().unwrap()
    }

    fn pair(score_id: u64, deviation_ms: f64) -> AlignedNotePair {
        AlignedNotePair {
            score_note_id: crate::score::ScoreNoteId(score_id),
            performance_note_id: PerformanceNoteId(score_id),
            confidence: 0.9,
            timing_deviation_ms: deviation_ms,
            timing_deviation_beats: 0.0,
            pitch_difference: 0,
            velocity_difference: 0,
            is_exact_pitch_match: true,
            is_octave_error: false,
        }
    }

    #[test]
    fn on_time_pairs_score_one_hundred() {
        let score = make_score();
        let performance = Performance { notes: vec![], sustain_events: vec![], soft_events: vec![], sostenuto_events: vec![] };
        let mut alignment = AlignmentResult::trivial();
        alignment.pairs = (1..=4).map(|i| pair(i, 0.0)).collect();
        let result = RhythmEvaluator.evaluate(&alignment, &score, &performance, &EvaluationOptions::default());
        assert_eq!(result.score, 100.0);
        assert_eq!(result.mean_deviation_ms, 0.0);
    }

    #[test]
    fn rushing_detected_from_consistently_early_notes() {
        let score = make_score();
        let performance = Performance { notes: vec![], sustain_events: vec![], soft_events: vec![], sostenuto_events: vec![] };
        let mut alignment = AlignmentResult::trivial();
        alignment.pairs = (1..=4).map(|i| pair(i, -80.0)).collect();
        let result = RhythmEvaluator.evaluate(&alignment, &score, &performance, &EvaluationOptions::default());
        assert!(result.systemic_issues.contains(&SystemicIssue::Rushing));
        assert!(result.per_note.iter().all(|n| n.severity == TimingSeverity::SlightlyEarly));
    }
}
