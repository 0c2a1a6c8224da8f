//! Needleman-Wunsch global sequence alignment with gap penalties
//! (spec.md §4.4). Used per-voice to resolve insertions/deletions that a
//! pure DTW collapses.

use crate::event::NoteEvent;

/// Outcome of one position in the traceback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NwOp {
    Pair(usize, usize),
    GapInScore(usize),
    GapInPerformance(usize),
}

/// Similarity score `s(S_i, P_j)`: +1 exact pitch match, +0.3 octave-only
/// match, else `-cost` using the full weighted cost function.
#[must_use]
pub fn similarity(a: &NoteEvent, b: &NoteEvent, weights: crate::config::CostWeights, timing_cap_ms: f64) -> f64 {
    if a.pitch == b.pitch {
        1.0
    } else if a.pitch_class() == b.pitch_class() {
        0.3
    } else {
        -super::cost::combined_cost(a, b, weights, timing_cap_ms)
    }
}

/// Align two time-mapped note sequences. Returns the traceback as a list of
/// [`NwOp`]s in left-to-right (time) order.
#[must_use]
pub fn align(
    score: &[NoteEvent],
    performance: &[NoteEvent],
    gap_penalty: f64,
    weights: crate::config::CostWeights,
    timing_cap_ms: f64,
) -> Vec<NwOp> {
    let (n, m) = (score.len(), performance.len());
    if n == 0 && m == 0 {
        return Vec::new();
    }

    let mut h = vec![vec![0.0_f64; m + 1]; n + 1];
    for i in 1..=n {
        h[i][0] = h[i - 1][0] - gap_penalty;
    }
    for j in 1..=m {
        h[0][j] = h[0][j - 1] - gap_penalty;
    }
    for i in 1..=n {
        for j in 1..=m {
            let diag = h[i - 1][j - 1] + similarity(&score[i - 1], &performance[j - 1], weights, timing_cap_ms);
            let up = h[i - 1][j] - gap_penalty; // gap in performance -> score note missed
            let left = h[i][j - 1] - gap_penalty; // gap in score -> performance note extra
            h[i][j] = diag.max(up).max(left);
        }
    }

    // Traceback, ties broken toward pair > gap_in_score > gap_in_performance.
    let mut ops = Vec::new();
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 {
            let diag = h[i - 1][j - 1] + similarity(&score[i - 1], &performance[j - 1], weights, timing_cap_ms);
            let up = h[i - 1][j] - gap_penalty;
            let left = h[i][j - 1] - gap_penalty;
            if (h[i][j] - diag).abs() < 1e-9 {
                ops.push(NwOp::Pair(i - 1, j - 1));
                i -= 1;
                j -= 1;
                continue;
            } else if (h[i][j] - left).abs() < 1e-9 {
                ops.push(NwOp::GapInScore(j - 1));
                j -= 1;
                continue;
            } else if (h[i][j] - up).abs() < 1e-9 {
                ops.push(NwOp::GapInPerformance(i - 1));
                i -= 1;
                continue;
            }
        }
        if j > 0 && (i == 0 || (h[i][j] - (h[i][j - 1] - gap_penalty)).abs() < 1e-9) {
            ops.push(NwOp::GapInScore(j - 1));
            j -= 1;
        } else if i > 0 {
            ops.push(NwOp::GapInPerformance(i - 1));
            i -= 1;
        }
    }
    ops.reverse();
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostWeights;

    fn event(pitch: u8, start_ms: f64) -> NoteEvent {
        NoteEvent { pitch, velocity: 80, start_tick: 0, duration_ticks: 0, start_ms, duration_ms: 0.0, channel: 0, voice: 0 }
    }

    #[test]
    fn identical_sequences_all_pair() {
        let notes: Vec<NoteEvent> = (0..5).map(|i| event(60 + i, i as f64 * 500.0)).collect();
        let ops = align(&notes, &notes, 0.8, CostWeights::default(), 500.0);
        assert_eq!(ops.len(), 5);
        for (idx, op) in ops.iter().enumerate() {
            assert_eq!(*op, NwOp::Pair(idx, idx));
        }
    }

    #[test]
    fn missing_note_produces_gap_in_performance() {
        let score: Vec<NoteEvent> = (0..3).map(|i| event(60 + i, i as f64 * 500.0)).collect();
        let performance = vec![event(60, 0.0), event(62, 1000.0)]; // missing middle note
        let ops = align(&score, &performance, 0.8, CostWeights::default(), 500.0);
        let gaps: Vec<_> = ops.iter().filter(|op| matches!(op, NwOp::GapInPerformance(_))).collect();
        assert_eq!(gaps.len(), 1);
    }

    #[test]
    fn extra_note_produces_gap_in_score() {
        let score = vec![event(60, 0.0), event(62, 500.0)];
        let performance = vec![event(60, 0.0), event(61, 250.0), event(62, 500.0)];
        let ops = align(&score, &performance, 0.8, CostWeights::default(), 500.0);
        let gaps: Vec<_> = ops.iter().filter(|op| matches!(op, NwOp::GapInScore(_))).collect();
        assert_eq!(gaps.len(), 1);
    }
}
