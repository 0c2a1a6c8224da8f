//! Error taxonomy for the evaluation engine.
//!
//! Only [`EvalError`] is ever raised (and only at [`crate::score::Score`]
//! construction). Every other condition the specification calls out as
//! "non-fatal" — empty streams, alignment catastrophes, real-time timeouts —
//! is represented as data on the result type instead, per the propagation
//! policy: evaluators never raise on evaluation-model conditions.

use thiserror::Error;

/// Fatal construction-time failure. Batch and real-time evaluation never
/// raise this once a [`crate::score::Score`] has been built successfully.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// `ppq` was not positive.
    #[error("invalid ppq: {0} (must be > 0)")]
    InvalidPpq(i64),
    /// A grace note's `parent_note_id` did not resolve to a note in the score.
    #[error("grace note {grace_id} references unresolved parent {parent_id}")]
    UnresolvedGraceParent { grace_id: u64, parent_id: u64 },
    /// Score notes were not sorted by `(start_tick, pitch)` and could not be
    /// repaired (duplicate ids, or caller-supplied order was relied upon).
    #[error("invalid score: {0}")]
    InvalidInput(String),
}

/// Severity of a reported [`Issue`], ordered low to high for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Minor,
    Moderate,
    Significant,
    Critical,
}

/// A single piece of structured feedback surfaced by an evaluator.
///
/// Duplicate issues (same `score_note_id` and `issue_type`) are collapsed by
/// the evaluator that produces them before they reach [`crate::evaluate::EvaluationResult`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub issue_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measure: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_note_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_note_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Issue {
    #[must_use]
    pub fn new(severity: IssueSeverity, issue_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity,
            issue_type: issue_type.into(),
            description: description.into(),
            measure: None,
            beat: None,
            score_note_id: None,
            performance_note_id: None,
            suggestion: None,
        }
    }

    #[must_use]
    pub fn with_measure(mut self, measure: u32) -> Self {
        self.measure = Some(measure);
        self
    }

    #[must_use]
    pub fn with_beat(mut self, beat: f64) -> Self {
        self.beat = Some(beat);
        self
    }

    #[must_use]
    pub fn with_score_note(mut self, id: u64) -> Self {
        self.score_note_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_performance_note(mut self, id: u64) -> Self {
        self.performance_note_id = Some(id);
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Deduplicate issues sharing the same `(score_note_id, issue_type)`, keeping
/// the first occurrence and the highest severity seen for that key.
pub(crate) fn dedup_issues(mut issues: Vec<Issue>) -> Vec<Issue> {
    use std::collections::HashMap;
    let mut best: HashMap<(Option<u64>, String), usize> = HashMap::new();
    let mut out: Vec<Issue> = Vec::with_capacity(issues.len());
    for issue in issues.drain(..) {
        let key = (issue.score_note_id, issue.issue_type.clone());
        if let Some(&idx) = best.get(&key) {
            if issue.severity > out[idx].severity {
                out[idx] = issue;
            }
        } else {
            best.insert(key, out.len());
            out.push(issue);
        }
    }
    out
}
