//! Real-time polyphonic performance evaluation engine.
//!
//! Compares a stream of captured MIDI note/pedal events against a
//! ground-truth [`score::Score`] and produces note-accuracy, rhythm, and
//! tempo-stability feedback. [`align::hybrid::align`] does the heavy
//! lifting (DTW coarse time mapping + per-voice Needleman-Wunsch), and
//! [`evaluate::run_all`] turns the resulting [`align::AlignmentResult`]
//! into scored, structured [`evaluate::EvaluationResult`]s. [`realtime::RealTimeDriver`]
//! wraps the same pipeline for live capture.

pub mod align;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod event;
pub mod performance;
pub mod realtime;
pub mod score;
pub mod tempo;

pub use align::{AlignedNotePair, AlignmentResult, MissedNote, MissedReason};
pub use config::EvaluationOptions;
pub use error::{EvalError, Issue, IssueSeverity};
pub use evaluate::{EvaluationResult, NoteAccuracyResult, RhythmResult, TempoResult};
pub use event::NoteEvent;
pub use performance::{PedalEvent, PedalKind, Performance, PerformanceBuilder, PerformanceNote, PerformanceNoteId};
pub use realtime::{DriverState, Progress, RealTimeDriver, RealTimeError, RealTimeFeedback};
pub use score::{Score, ScoreBuilder, ScoreNote, ScoreNoteId};

/// Batch evaluation pipeline (spec.md §6): align `performance` against
/// `score`, then run every evaluator over the result.
#[must_use]
pub fn evaluate(score: &Score, performance: &Performance, options: &EvaluationOptions) -> EvaluationResult {
    let alignment = align::hybrid::align(score, performance, options);
    evaluate::run_all(&alignment, score, performance, options)
}
