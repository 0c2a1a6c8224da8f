//! Dynamic Time Warping aligner (spec.md §4.3).
//!
//! Produces a monotone warping path between two note sequences using
//! chroma (pitch-class) features, so the coarse time mapping stays
//! octave-invariant. Bounded to a Sakoe-Chiba band around the main
//! diagonal so cost is `O((|S| + |P|) * W)`.

use crate::event::NoteEvent;

/// Result of a DTW run: the warping path plus derived tempo/offset estimates.
#[derive(Clone, Debug)]
pub struct DtwResult {
    pub warping_path: Vec<(usize, usize)>,
    pub estimated_tempo_ratio: f64,
    pub time_offset_ms: f64,
    pub average_cost: f64,
}

const INF: f64 = f64::INFINITY;

/// Run banded DTW over `score` vs `performance` chroma/timing features.
/// Returns `None` if either sequence is empty.
#[must_use]
pub fn align(score: &[NoteEvent], performance: &[NoteEvent], lambda: f64, timing_cap_ms: f64, band_width: usize) -> Option<DtwResult> {
    let (n, m) = (score.len(), performance.len());
    if n == 0 || m == 0 {
        return None;
    }

    // Sakoe-Chiba band: only cells with |i*m/n - j| <= band_width (+ slope
    // correction for non-square sequences) are reachable.
    let band = band_width.max(1);
    let in_band = |i: usize, j: usize| -> bool {
        let expected_j = (i as f64) * (m as f64) / (n as f64);
        ((j as f64) - expected_j).abs() <= band as f64
    };

    let mut d = vec![vec![INF; m]; n];
    for i in 0..n {
        for j in 0..m {
            if !in_band(i, j) {
                continue;
            }
            let cost = super::cost::chroma_cost(&score[i], &performance[j], lambda, timing_cap_ms);
            let best_prev = if i == 0 && j == 0 {
                0.0
            } else {
                let diag = if i > 0 && j > 0 { d[i - 1][j - 1] } else { INF };
                let up = if i > 0 { d[i - 1][j] } else { INF };
                let left = if j > 0 { d[i][j - 1] } else { INF };
                // Diagonal preferred on ties, per spec.md §4.3.
                if diag <= up && diag <= left {
                    diag
                } else if up <= left {
                    up
                } else {
                    left
                }
            };
            d[i][j] = cost + best_prev;
        }
    }

    // Traceback from (n-1, m-1).
    let mut path = Vec::new();
    let (mut i, mut j) = (n - 1, m - 1);
    loop {
        path.push((i, j));
        if i == 0 && j == 0 {
            break;
        }
        let diag = if i > 0 && j > 0 { d[i - 1][j - 1] } else { INF };
        let up = if i > 0 { d[i - 1][j] } else { INF };
        let left = if j > 0 { d[i][j - 1] } else { INF };
        if diag <= up && diag <= left && i > 0 && j > 0 {
            i -= 1;
            j -= 1;
        } else if up <= left && i > 0 {
            i -= 1;
        } else if j > 0 {
            j -= 1;
        } else {
            break;
        }
    }
    path.reverse();

    let total_cost = d[n - 1][m - 1];
    let average_cost = total_cost / path.len() as f64;

    // Robust (median) linear fit through the path for tempo ratio and offset.
    let mut offsets: Vec<f64> = Vec::with_capacity(path.len());
    for &(pi, pj) in &path {
        offsets.push(performance[pj].start_ms - score[pi].start_ms);
    }
    let s0 = score[0].start_ms;
    let p0 = performance[0].start_ms;
    let mut ratios: Vec<f64> = path
        .iter()
        .filter(|&&(pi, _)| pi > 0)
        .map(|&(pi, pj)| ((performance[pj].start_ms - p0) / (score[pi].start_ms - s0).max(1e-9)).abs())
        .collect();
    let tempo_ratio = median(&mut ratios).unwrap_or(1.0);
    let time_offset_ms = median(&mut offsets).unwrap_or(0.0);

    Some(DtwResult { warping_path: path, estimated_tempo_ratio: tempo_ratio, time_offset_ms, average_cost })
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    Some(if values.len().is_multiple_of(2) { (values[mid - 1] + values[mid]) / 2.0 } else { values[mid] })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pitch: u8, start_ms: f64) -> NoteEvent {
        NoteEvent { pitch, velocity: 80, start_tick: 0, duration_ticks: 0, start_ms, duration_ms: 0.0, channel: 0, voice: 0 }
    }

    #[test]
    fn identical_sequences_align_on_diagonal() {
        let notes: Vec<NoteEvent> = (0..5).map(|i| event(60 + i, i as f64 * 500.0)).collect();
        let result = align(&notes, &notes, 0.3, 500.0, 32).unwrap();
        assert_eq!(result.warping_path.len(), 5);
        for (i, (pi, pj)) in result.warping_path.iter().enumerate() {
            assert_eq!(*pi, i);
            assert_eq!(*pj, i);
        }
        assert!((result.estimated_tempo_ratio - 1.0).abs() < 1e-6);
        assert!(result.time_offset_ms.abs() < 1e-6);
    }

    #[test]
    fn stretched_performance_detects_tempo_ratio() {
        let score: Vec<NoteEvent> = (0..8).map(|i| event(60 + i, i as f64 * 500.0)).collect();
        let performance: Vec<NoteEvent> = (0..8).map(|i| event(60 + i, i as f64 * 1000.0)).collect();
        let result = align(&score, &performance, 0.3, 500.0, 32).unwrap();
        assert!((result.estimated_tempo_ratio - 2.0).abs() < 0.05);
    }

    #[test]
    fn empty_sequence_returns_none() {
        assert!(align(&[], &[], 0.3, 500.0, 32).is_none());
    }
}
