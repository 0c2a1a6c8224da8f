//! Tempo map and time signature arithmetic (spec.md §3, §4.1).
//!
//! [`TempoMap::tick_to_ms`] integrates cumulatively across tempo segment
//! boundaries rather than applying the initial tempo to the whole piece —
//! this is the spec's resolution of the open question about which
//! integration style to standardize on (see DESIGN.md).

use serde::{Deserialize, Serialize};

/// One tempo segment: active from `start_tick` until the next segment's
/// `start_tick` (or forever, for the last segment).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempoMarking {
    pub start_tick: i64,
    pub microseconds_per_quarter: u32,
}

impl TempoMarking {
    #[must_use]
    pub fn bpm(&self) -> f64 {
        60_000_000.0 / f64::from(self.microseconds_per_quarter)
    }
}

/// Piecewise-constant function from ticks to microseconds-per-quarter,
/// ordered by `start_tick`. Precomputes cumulative millisecond offsets at
/// each segment boundary so `tick_to_ms`/`ms_to_tick` can binary-search in
/// `O(log T)` instead of re-integrating from the start every call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempoMap {
    ppq: i64,
    markings: Vec<TempoMarking>,
    /// `cumulative_ms[i]` = ms elapsed from tick 0 to `markings[i].start_tick`.
    cumulative_ms: Vec<f64>,
}

impl TempoMap {
    /// Build a tempo map. `markings` must be non-empty and sorted by
    /// `start_tick`; the first marking's `start_tick` should be 0.
    #[must_use]
    pub fn new(ppq: i64, mut markings: Vec<TempoMarking>) -> Self {
        if markings.is_empty() {
            markings.push(TempoMarking { start_tick: 0, microseconds_per_quarter: 500_000 });
        }
        markings.sort_by_key(|m| m.start_tick);

        let mut cumulative_ms = Vec::with_capacity(markings.len());
        let mut acc_ms = 0.0;
        cumulative_ms.push(0.0);
        for pair in markings.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let segment_ticks = (next.start_tick - prev.start_tick) as f64;
            acc_ms += segment_ticks * f64::from(prev.microseconds_per_quarter) / (ppq as f64 * 1000.0);
            cumulative_ms.push(acc_ms);
        }

        Self { ppq, markings, cumulative_ms }
    }

    #[must_use]
    pub fn ppq(&self) -> i64 {
        self.ppq
    }

    /// Index of the tempo segment active at `tick` (binary search over starts).
    fn segment_index(&self, tick: i64) -> usize {
        match self.markings.binary_search_by_key(&tick, |m| m.start_tick) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        }
    }

    /// Convert a tick position to milliseconds from the start of the piece.
    /// `O(log T)` over the number of tempo changes `T`.
    #[must_use]
    pub fn tick_to_ms(&self, tick: i64) -> f64 {
        let idx = self.segment_index(tick);
        let marking = self.markings[idx];
        let delta_ticks = (tick - marking.start_tick) as f64;
        self.cumulative_ms[idx] + delta_ticks * f64::from(marking.microseconds_per_quarter) / (self.ppq as f64 * 1000.0)
    }

    /// Inverse of [`Self::tick_to_ms`].
    #[must_use]
    pub fn ms_to_tick(&self, ms: f64) -> i64 {
        let idx = match self.cumulative_ms.binary_search_by(|probe| probe.partial_cmp(&ms).unwrap()) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let marking = self.markings[idx];
        let delta_ms = ms - self.cumulative_ms[idx];
        let delta_ticks = delta_ms * (self.ppq as f64 * 1000.0) / f64::from(marking.microseconds_per_quarter);
        marking.start_tick + delta_ticks.round() as i64
    }

    /// BPM active at `tick`.
    #[must_use]
    pub fn bpm_at(&self, tick: i64) -> f64 {
        self.markings[self.segment_index(tick)].bpm()
    }
}

/// A time signature change, active from `start_tick`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub start_tick: i64,
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    #[must_use]
    pub fn ticks_per_measure(&self, ppq: i64) -> i64 {
        ppq * i64::from(self.numerator) * 4 / i64::from(self.denominator)
    }

    #[must_use]
    pub fn ticks_per_beat(&self, ppq: i64) -> i64 {
        ppq * 4 / i64::from(self.denominator)
    }

    #[must_use]
    pub fn is_compound(&self) -> bool {
        self.denominator == 8 && self.numerator.is_multiple_of(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_tempo_roundtrip() {
        let map = TempoMap::new(480, vec![TempoMarking { start_tick: 0, microseconds_per_quarter: 500_000 }]);
        assert!((map.tick_to_ms(480) - 500.0).abs() < 1e-9);
        assert!((map.tick_to_ms(960) - 1000.0).abs() < 1e-9);
        assert_eq!(map.ms_to_tick(500.0), 480);
        assert!((map.bpm_at(0) - 120.0).abs() < 1e-9);
    }

    #[test]
    fn tempo_change_integrates_cumulatively() {
        let map = TempoMap::new(
            480,
            vec![
                TempoMarking { start_tick: 0, microseconds_per_quarter: 500_000 }, // 120 bpm
                TempoMarking { start_tick: 960, microseconds_per_quarter: 1_000_000 }, // 60 bpm after 2 quarters
            ],
        );
        // first two quarters at 120bpm = 1000ms, then one quarter at 60bpm = 1000ms
        assert!((map.tick_to_ms(960) - 1000.0).abs() < 1e-9);
        assert!((map.tick_to_ms(1440) - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn time_signature_derivations() {
        let four_four = TimeSignature { start_tick: 0, numerator: 4, denominator: 4 };
        assert_eq!(four_four.ticks_per_measure(480), 1920);
        assert_eq!(four_four.ticks_per_beat(480), 480);
        assert!(!four_four.is_compound());

        let six_eight = TimeSignature { start_tick: 0, numerator: 6, denominator: 8 };
        assert!(six_eight.is_compound());
    }
}
