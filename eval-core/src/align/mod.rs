//! Alignment between a [`crate::score::Score`] and a [`crate::performance::Performance`]
//! (spec.md §3, §4.3-§4.5).

pub mod cost;
pub mod dtw;
pub mod hybrid;
pub mod nw;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::performance::PerformanceNoteId;
use crate::score::ScoreNoteId;

/// One matched pair of (score note, performance note) produced by alignment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignedNotePair {
    pub score_note_id: ScoreNoteId,
    pub performance_note_id: PerformanceNoteId,
    /// Confidence in `[0, 1]` (spec.md §4.5 step 6).
    pub confidence: f64,
    pub timing_deviation_ms: f64,
    pub timing_deviation_beats: f64,
    pub pitch_difference: i32,
    pub velocity_difference: i32,
    pub is_exact_pitch_match: bool,
    pub is_octave_error: bool,
}

/// Why a score note was not matched to any performance note.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedReason {
    Skipped,
    Substituted,
    PassageSkipped,
    TimingMismatch,
    OptionalOrnament,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissedNote {
    pub expected_score_note_id: ScoreNoteId,
    pub substituted_by: Option<PerformanceNoteId>,
    pub inferred_reason: MissedReason,
}

/// Result of aligning a score against a performance.
///
/// Invariant: every score note id appears in exactly one of
/// `pairs[*].score_note_id` or `missed_notes[*].expected_score_note_id`;
/// every performance note id appears in exactly one of
/// `pairs[*].performance_note_id` or `extra_notes`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub pairs: Vec<AlignedNotePair>,
    pub missed_notes: Vec<MissedNote>,
    pub extra_notes: Vec<PerformanceNoteId>,
    /// Sequence of `(score_index, performance_index)` steps through the DTW cost matrix.
    pub warping_path: Vec<(usize, usize)>,
    pub estimated_tempo_ratio: f64,
    pub time_offset_ms: f64,
    pub algorithm_name: &'static str,
    pub compute_time: Duration,
    /// `true` when the average DTW cost exceeded the catastrophe threshold.
    pub is_catastrophe: bool,
}

impl AlignmentResult {
    #[must_use]
    pub fn trivial() -> Self {
        Self {
            pairs: Vec::new(),
            missed_notes: Vec::new(),
            extra_notes: Vec::new(),
            warping_path: Vec::new(),
            estimated_tempo_ratio: 1.0,
            time_offset_ms: 0.0,
            algorithm_name: "trivial",
            compute_time: Duration::ZERO,
            is_catastrophe: false,
        }
    }
}
