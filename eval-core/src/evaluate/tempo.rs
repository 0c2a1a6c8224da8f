//! Tempo evaluator (spec.md §4.8).

use serde::{Deserialize, Serialize};

use crate::align::AlignmentResult;
use crate::config::EvaluationOptions;
use crate::error::{dedup_issues, Issue, IssueSeverity};
use crate::performance::Performance;
use crate::score::Score;

use super::Evaluator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftTrend {
    Accelerating,
    Decelerating,
    Steady,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TempoSegment {
    pub index: usize,
    pub start_measure: u32,
    pub end_measure: u32,
    pub note_count: usize,
    pub bpm: f64,
    pub deviation: f64,
    pub stability: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TempoResult {
    pub score: f64,
    pub detected_bpm: f64,
    pub expected_bpm: f64,
    pub deviation: f64,
    pub stability: f64,
    pub drift_trend: DriftTrend,
    pub segments: Vec<TempoSegment>,
    pub issues: Vec<Issue>,
}

pub struct TempoEvaluator;

impl Evaluator for TempoEvaluator {
    type Output = TempoResult;

    fn name(&self) -> &'static str {
        "tempo"
    }

    fn evaluate(&self, alignment: &AlignmentResult, score: &Score, performance: &Performance, options: &EvaluationOptions) -> TempoResult {
        let t = options.tempo_thresholds;

        let mut ordered: Vec<_> = alignment
            .pairs
            .iter()
            .filter_map(|pair| {
                let score_note = score.find(pair.score_note_id)?;
                let perf_note = performance.find(pair.performance_note_id)?;
                Some((score_note, perf_note))
            })
            .collect();
        ordered.sort_by_key(|a| a.0.event.start_tick);

        if ordered.len() < 2 {
            return TempoResult {
                score: 0.0,
                detected_bpm: 0.0,
                expected_bpm: 0.0,
                deviation: 0.0,
                stability: 0.0,
                drift_trend: DriftTrend::Steady,
                segments: Vec::new(),
                issues: vec![Issue::new(IssueSeverity::Info, "EmptyStream", "fewer than 2 paired notes; tempo not evaluated")],
            };
        }

        let mut ratios = Vec::new();
        for window in ordered.windows(2) {
            let (s0, p0) = window[0];
            let (s1, p1) = window[1];
            let expected_ioi = s1.event.start_ms - s0.event.start_ms;
            if expected_ioi <= 10.0 {
                continue;
            }
            let actual_ioi = p1.event.start_ms - p0.event.start_ms;
            ratios.push(actual_ioi / expected_ioi);
        }

        let expected_bpm = score.tempo_map().bpm_at(ordered[0].0.event.start_tick);

        if ratios.is_empty() {
            return TempoResult {
                score: 0.0,
                detected_bpm: expected_bpm,
                expected_bpm,
                deviation: 0.0,
                stability: 1.0,
                drift_trend: DriftTrend::Steady,
                segments: Vec::new(),
                issues: vec![Issue::new(IssueSeverity::Info, "EmptyStream", "no usable inter-onset intervals")],
            };
        }

        let ratio_median = median(&mut ratios.clone()).unwrap_or(1.0);
        let detected_bpm = expected_bpm / ratio_median;
        let deviation = (detected_bpm - expected_bpm) / expected_bpm;

        let mut by_segment: std::collections::BTreeMap<usize, Vec<f64>> = std::collections::BTreeMap::new();
        let mut measures_by_segment: std::collections::BTreeMap<usize, (u32, u32)> = std::collections::BTreeMap::new();
        for window in ordered.windows(2) {
            let (s0, p0) = window[0];
            let (s1, p1) = window[1];
            let expected_ioi = s1.event.start_ms - s0.event.start_ms;
            if expected_ioi <= 10.0 {
                continue;
            }
            let actual_ioi = p1.event.start_ms - p0.event.start_ms;
            let segment_index = ((s0.measure.saturating_sub(1)) / t.segment_measures) as usize;
            by_segment.entry(segment_index).or_default().push(actual_ioi / expected_ioi);
            let entry = measures_by_segment.entry(segment_index).or_insert((s0.measure, s0.measure));
            entry.0 = entry.0.min(s0.measure);
            entry.1 = entry.1.max(s1.measure);
        }

        let mut segments = Vec::new();
        let mut segment_deviations = Vec::new();
        for (&index, ratios) in &by_segment {
            if ratios.len() < t.min_notes_per_segment {
                continue;
            }
            let mut sorted = ratios.clone();
            let segment_median = median(&mut sorted).unwrap_or(1.0);
            let segment_bpm = expected_bpm / segment_median;
            let segment_deviation = (segment_bpm - expected_bpm) / expected_bpm;
            let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
            let variance = ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / ratios.len() as f64;
            let segment_stability = 1.0 - variance.sqrt();
            segment_deviations.push(segment_deviation);
            let (start_measure, end_measure) = measures_by_segment[&index];
            segments.push(TempoSegment {
                index,
                start_measure,
                end_measure,
                note_count: ratios.len(),
                bpm: segment_bpm,
                deviation: segment_deviation,
                stability: segment_stability,
            });
        }

        let stability = if segment_deviations.len() >= 2 {
            let mean = segment_deviations.iter().sum::<f64>() / segment_deviations.len() as f64;
            let variance = segment_deviations.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / segment_deviations.len() as f64;
            (1.0 - variance.sqrt() / 0.2).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let drift_trend = if segments.len() >= 2 {
            let (slope, _) = linear_regression(&segments.iter().map(|s| (s.index as f64, s.bpm)).collect::<Vec<_>>());
            let avg_bpm = segments.iter().map(|s| s.bpm).sum::<f64>() / segments.len() as f64;
            let ratio = slope / avg_bpm;
            if ratio > t.drift_slope_ratio {
                DriftTrend::Accelerating
            } else if ratio < -t.drift_slope_ratio {
                DriftTrend::Decelerating
            } else {
                DriftTrend::Steady
            }
        } else {
            DriftTrend::Steady
        };

        let mut issues = Vec::new();
        if deviation.abs() > t.deviation_limit {
            let description = if deviation > 0.0 { format!("tempo is {:.0}% too fast", deviation * 100.0) } else { format!("tempo is {:.0}% too slow", -deviation * 100.0) };
            issues.push(Issue::new(IssueSeverity::Moderate, "TempoDeviation", description));
        }
        if stability < t.stability_limit {
            issues.push(Issue::new(IssueSeverity::Moderate, "Unstable", format!("tempo stability {stability:.2} below threshold")));
        }
        for segment in &segments {
            if segment.deviation.abs() > t.segment_deviation_limit {
                issues.push(
                    Issue::new(IssueSeverity::Minor, "LocalTempoIssue", format!("segment {} deviates {:.0}%", segment.index, segment.deviation * 100.0))
                        .with_measure(segment.start_measure),
                );
            }
        }
        match drift_trend {
            DriftTrend::Accelerating => issues.push(Issue::new(IssueSeverity::Minor, "Accelerating", "tempo is drifting faster over time")),
            DriftTrend::Decelerating => issues.push(Issue::new(IssueSeverity::Minor, "Decelerating", "tempo is drifting slower over time")),
            DriftTrend::Steady => {}
        }

        let f = piecewise_deviation_penalty(deviation.abs());
        let drift_penalty = if drift_trend == DriftTrend::Steady { 0.0 } else { 10.0 };
        let raw_score = 100.0 - f - (1.0 - stability) * 30.0 - drift_penalty;

        TempoResult {
            score: raw_score.clamp(0.0, 100.0),
            detected_bpm,
            expected_bpm,
            deviation,
            stability,
            drift_trend,
            segments,
            issues: dedup_issues(issues),
        }
    }
}

/// Piecewise deviation penalty `f` (spec.md §4.8): 0→0, 0.1→10 linear, 0.2→25, ≥0.3→40.
fn piecewise_deviation_penalty(abs_deviation: f64) -> f64 {
    if abs_deviation >= 0.3 {
        40.0
    } else if abs_deviation >= 0.2 {
        25.0 + (abs_deviation - 0.2) / 0.1 * 15.0
    } else if abs_deviation >= 0.1 {
        10.0 + (abs_deviation - 0.1) / 0.1 * 15.0
    } else {
        abs_deviation / 0.1 * 10.0
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    Some(if values.len().is_multiple_of(2) { (values[mid - 1] + values[mid]) / 2.0 } else { values[mid] })
}

/// Ordinary least squares slope and intercept of `points`.
fn linear_regression(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let numerator: f64 = points.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    let denominator: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if denominator.abs() < 1e-9 {
        (0.0, mean_y)
    } else {
        let slope = numerator / denominator;
        (slope, mean_y - slope * mean_x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::AlignedNotePair;
    use crate::performance::{PerformanceBuilder, PerformanceNoteId};
    use crate::score::{Articulation, ScoreBuilder, ScoreNoteId, Staff};

    fn make_score(n: usize) -> Score {
        let mut b = ScoreBuilder::new(480);
        for i in 0..n {
            let tick = i as i64 * 480;
            let start_ms = tick as f64 * 500.0 / 480.0;
            let event = crate::event::NoteEvent { pitch: 60, velocity: 80, start_tick: tick, duration_ticks: 480, start_ms, duration_ms: 500.0, channel: 0, voice: 0 };
            b.add_note(event, (i + 1) as u32, 1.0, false, None, None, false, None, Articulation::Normal, Staff::Right);
        }
        b.build().unwrap()
    }

    fn make_performance(start_times_ms: &[f64]) -> Performance {
        let mut b = PerformanceBuilder::new();
        for (i, &ms) in start_times_ms.iter().enumerate() {
            b.on_note_on(60, 80, ms);
            b.on_note_off(60, ms + 400.0, None);
            let _ = i;
        }
        b.build()
    }

    fn alignment_for(score: &Score, performance: &Performance) -> AlignmentResult {
        let mut alignment = AlignmentResult::trivial();
        alignment.pairs = score
            .notes
            .iter()
            .zip(performance.notes.iter())
            .map(|(s, p)| AlignedNotePair {
                score_note_id: s.id,
                performance_note_id: p.id,
                confidence: 0.9,
                timing_deviation_ms: p.event.start_ms - s.event.start_ms,
                timing_deviation_beats: 0.0,
                pitch_difference: 0,
                velocity_difference: 0,
                is_exact_pitch_match: true,
                is_octave_error: false,
            })
            .collect();
        alignment
    }

    #[test]
    fn matched_tempo_has_zero_deviation() {
        let score = make_score(8);
        let start_times: Vec<f64> = (0..8).map(|i| i as f64 * 500.0).collect();
        let performance = make_performance(&start_times);
        let alignment = alignment_for(&score, &performance);
        let result = TempoEvaluator.evaluate(&alignment, &score, &performance, &EvaluationOptions::default());
        assert!((result.detected_bpm - 120.0).abs() < 1.0);
        assert!(result.deviation.abs() < 0.01);
        assert_eq!(result.drift_trend, DriftTrend::Steady);
    }

    #[test]
    fn accelerando_is_detected_as_accelerating() {
        let score = make_score(16);
        let mut t = 0.0;
        let mut start_times = vec![0.0];
        for i in 0..15 {
            let ioi = 500.0 - (i as f64 / 15.0) * 100.0;
            t += ioi;
            start_times.push(t);
        }
        let performance = make_performance(&start_times);
        let alignment = alignment_for(&score, &performance);
        let result = TempoEvaluator.evaluate(&alignment, &score, &performance, &EvaluationOptions::default());
        assert_eq!(result.drift_trend, DriftTrend::Accelerating);
    }

    #[test]
    fn fewer_than_two_pairs_yields_empty_stream_issue() {
        let score = make_score(1);
        let performance = make_performance(&[0.0]);
        let mut alignment = AlignmentResult::trivial();
        alignment.pairs = vec![AlignedNotePair {
            score_note_id: ScoreNoteId(1),
            performance_note_id: PerformanceNoteId(1),
            confidence: 0.9,
            timing_deviation_ms: 0.0,
            timing_deviation_beats: 0.0,
            pitch_difference: 0,
            velocity_difference: 0,
            is_exact_pitch_match: true,
            is_octave_error: false,
        }];
        let result = TempoEvaluator.evaluate(&alignment, &score, &performance, &EvaluationOptions::default());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.issues[0].issue_type, "EmptyStream");
    }
}
