//! Cost functions shared by the DTW and Needleman-Wunsch aligners
//! (spec.md §4.2). Each component is normalized to `[0, 1]`; the combined
//! cost must be zero for an exact identical pair and monotone in each
//! component, which the defaults below preserve.

use crate::config::CostWeights;
use crate::event::NoteEvent;

/// Pitch cost: 0 exact match, 0.3 octave error, else scaled by semitone distance.
#[must_use]
pub fn pitch_cost(a: &NoteEvent, b: &NoteEvent) -> f64 {
    if a.pitch == b.pitch {
        0.0
    } else if a.pitch_class() == b.pitch_class() {
        0.3
    } else {
        let delta = (i32::from(a.pitch) - i32::from(b.pitch)).abs();
        (f64::from(delta) / 12.0).min(1.0)
    }
}

/// Timing cost in milliseconds, capped at `timing_cost_cap_ms`.
#[must_use]
pub fn timing_cost_ms(a_ms: f64, b_ms: f64, cap_ms: f64) -> f64 {
    ((a_ms - b_ms).abs() / cap_ms).min(1.0)
}

/// Timing cost in beats, capped at 2 beats.
#[must_use]
pub fn timing_cost_beats(delta_beats: f64) -> f64 {
    (delta_beats.abs() / 2.0).min(1.0)
}

/// Velocity cost, capped at a spread of 64.
#[must_use]
pub fn velocity_cost(a: &NoteEvent, b: &NoteEvent) -> f64 {
    let delta = (i32::from(a.velocity) - i32::from(b.velocity)).abs();
    (f64::from(delta) / 64.0).min(1.0)
}

/// Weighted sum of the three cost components.
#[must_use]
pub fn combined_cost(a: &NoteEvent, b: &NoteEvent, weights: CostWeights, timing_cap_ms: f64) -> f64 {
    weights.pitch * pitch_cost(a, b)
        + weights.timing * timing_cost_ms(a.start_ms, b.start_ms, timing_cap_ms)
        + weights.velocity * velocity_cost(a, b)
}

/// Chroma-only (octave invariant) pitch-class cost plus timing, used by the
/// DTW aligner which deliberately ignores octave (spec.md §4.3).
#[must_use]
pub fn chroma_cost(a: &NoteEvent, b: &NoteEvent, lambda: f64, timing_cap_ms: f64) -> f64 {
    let pitch_class_cost = if a.pitch_class() == b.pitch_class() { 0.0 } else { 1.0 };
    pitch_class_cost + lambda * timing_cost_ms(a.start_ms, b.start_ms, timing_cap_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pitch: u8, velocity: u8, start_ms: f64) -> NoteEvent {
        NoteEvent { pitch, velocity, start_tick: 0, duration_ticks: 0, start_ms, duration_ms: 0.0, channel: 0, voice: 0 }
    }

    #[test]
    fn exact_identical_pair_has_zero_cost() {
        let a = event(60, 80, 100.0);
        let weights = CostWeights::default();
        assert_eq!(combined_cost(&a, &a, weights, 500.0), 0.0);
    }

    #[test]
    fn octave_error_costs_less_than_wrong_pitch() {
        let a = event(60, 80, 0.0);
        let octave = event(72, 80, 0.0);
        let wrong = event(66, 80, 0.0);
        assert!(pitch_cost(&a, &octave) < pitch_cost(&a, &wrong));
    }

    #[test]
    fn timing_cost_is_capped() {
        assert_eq!(timing_cost_ms(0.0, 10_000.0, 500.0), 1.0);
    }

    #[test]
    fn cost_is_monotone_in_timing_delta() {
        let a = event(60, 80, 0.0);
        let near = event(60, 80, 10.0);
        let far = event(60, 80, 100.0);
        let weights = CostWeights::default();
        assert!(combined_cost(&a, &near, weights, 500.0) < combined_cost(&a, &far, weights, 500.0));
    }
}
