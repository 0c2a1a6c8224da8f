//! Evaluators that turn an [`crate::align::AlignmentResult`] into scored,
//! structured feedback (spec.md §4.6-§4.8).
//!
//! REDESIGN FLAGS §9 item 1: rather than a generic reflective evaluator
//! abstraction, this is a fixed tagged set of result variants behind one
//! [`Evaluator`] trait — no runtime reflection.

pub mod note_accuracy;
pub mod rhythm;
pub mod tempo;

use serde::{Deserialize, Serialize};

use crate::align::AlignmentResult;
use crate::config::EvaluationOptions;
use crate::performance::Performance;
use crate::score::Score;

pub use note_accuracy::{NoteAccuracyEvaluator, NoteAccuracyResult};
pub use rhythm::{RhythmEvaluator, RhythmResult};
pub use tempo::{TempoEvaluator, TempoResult};

/// Shared contract implemented by [`NoteAccuracyEvaluator`], [`RhythmEvaluator`]
/// and [`TempoEvaluator`].
pub trait Evaluator {
    type Output;

    fn name(&self) -> &'static str;

    fn evaluate(&self, alignment: &AlignmentResult, score: &Score, performance: &Performance, options: &EvaluationOptions) -> Self::Output;
}

/// Aggregated result of running all three evaluators over one alignment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub alignment_algorithm: &'static str,
    pub note_accuracy: NoteAccuracyResult,
    pub rhythm: RhythmResult,
    pub tempo: TempoResult,
    /// Forced to `Some(0.0)` when the alignment was a catastrophe (spec.md
    /// §4.5 failure modes, §7 `AlignmentCatastrophe`); `None` otherwise,
    /// meaning `overall_score` falls back to the mean of the sub-scores.
    pub normalized_score: Option<f64>,
}

impl EvaluationResult {
    /// Letter grade for a given 0-100 score (spec.md §6, bit-exact table).
    #[must_use]
    pub fn grade_letter(score: f64) -> &'static str {
        match score {
            s if s >= 97.0 => "A+",
            s if s >= 93.0 => "A",
            s if s >= 90.0 => "A-",
            s if s >= 87.0 => "B+",
            s if s >= 83.0 => "B",
            s if s >= 80.0 => "B-",
            s if s >= 77.0 => "C+",
            s if s >= 73.0 => "C",
            s if s >= 70.0 => "C-",
            s if s >= 67.0 => "D+",
            s if s >= 63.0 => "D",
            s if s >= 60.0 => "D-",
            _ => "F",
        }
    }

    /// Overall score: `normalized_score` if the alignment was a catastrophe
    /// (always 0), otherwise the mean of the three sub-scores. Not
    /// specified as a single number by spec.md, but useful as a one-line
    /// summary; the three components remain the authoritative scores.
    #[must_use]
    pub fn overall_score(&self) -> f64 {
        self.normalized_score.unwrap_or((self.note_accuracy.score + self.rhythm.score + self.tempo.score) / 3.0)
    }
}

/// Run all three evaluators over `alignment` and assemble an [`EvaluationResult`].
#[must_use]
pub fn run_all(alignment: &AlignmentResult, score: &Score, performance: &Performance, options: &EvaluationOptions) -> EvaluationResult {
    let note_accuracy = NoteAccuracyEvaluator.evaluate(alignment, score, performance, options);
    let rhythm = RhythmEvaluator.evaluate(alignment, score, performance, options);
    let tempo = TempoEvaluator.evaluate(alignment, score, performance, options);
    let normalized_score = alignment.is_catastrophe.then_some(0.0);
    EvaluationResult { alignment_algorithm: alignment.algorithm_name, note_accuracy, rhythm, tempo, normalized_score }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_letter_boundaries_are_bit_exact() {
        assert_eq!(EvaluationResult::grade_letter(100.0), "A+");
        assert_eq!(EvaluationResult::grade_letter(97.0), "A+");
        assert_eq!(EvaluationResult::grade_letter(96.9), "A");
        assert_eq!(EvaluationResult::grade_letter(90.0), "A-");
        assert_eq!(EvaluationResult::grade_letter(60.0), "D-");
        assert_eq!(EvaluationResult::grade_letter(59.9), "F");
        assert_eq!(EvaluationResult::grade_letter(0.0), "F");
    }
}
