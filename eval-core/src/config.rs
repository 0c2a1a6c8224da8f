//! Evaluation options — centralizes every tunable threshold the
//! specification names instead of scattering magic numbers across modules.
//!
//! Defaults match the specification's documented defaults exactly so that
//! `EvaluationOptions::default()` reproduces the bit-exact behaviors of
//! §6 and the scenarios of §8 without further configuration.

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Which aligner the hybrid pipeline should use end to end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignerChoice {
    Dtw,
    Nw,
    #[default]
    Hybrid,
}

/// Weights combining the three normalized cost components (§4.2).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    pub pitch: f64,
    pub timing: f64,
    pub velocity: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self { pitch: 0.6, timing: 0.3, velocity: 0.1 }
    }
}

/// Weighted penalties for the note-accuracy evaluator (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccuracyWeights {
    pub wrong: f64,
    pub octave: f64,
    pub octave_credit: f64,
    pub missed: f64,
    pub extra: f64,
}

impl Default for AccuracyWeights {
    fn default() -> Self {
        Self { wrong: 3.0, octave: 1.0, octave_credit: 0.5, missed: 2.5, extra: 0.5 }
    }
}

/// Rhythm severity thresholds in milliseconds (§4.7).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RhythmThresholds {
    pub on_time_ms: f64,
    pub slight_ms: f64,
    pub extreme_ms: f64,
    pub uneven_stddev_ms: f64,
}

impl Default for RhythmThresholds {
    fn default() -> Self {
        Self { on_time_ms: 30.0, slight_ms: 50.0, extreme_ms: 100.0, uneven_stddev_ms: 40.0 }
    }
}

/// Tempo evaluator segmentation and stability thresholds (§4.8).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempoThresholds {
    pub segment_measures: u32,
    pub min_notes_per_segment: usize,
    pub deviation_limit: f64,
    pub stability_limit: f64,
    pub segment_deviation_limit: f64,
    pub drift_slope_ratio: f64,
}

impl Default for TempoThresholds {
    fn default() -> Self {
        Self {
            segment_measures: 4,
            min_notes_per_segment: 4,
            deviation_limit: 0.15,
            stability_limit: 0.85,
            segment_deviation_limit: 0.20,
            drift_slope_ratio: 0.02,
        }
    }
}

/// Real-time driver tuning (§4.9).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RealTimeOptions {
    pub buffer_capacity: usize,
    pub min_window: usize,
    pub min_feedback_interval_ms: f64,
    pub lookahead: usize,
    pub mismatch_window_ms: f64,
}

impl Default for RealTimeOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 256,
            min_window: 4,
            min_feedback_interval_ms: 500.0,
            lookahead: 8,
            mismatch_window_ms: 500.0,
        }
    }
}

/// Top-level options threading through the batch pipeline (§6) and shared
/// by the real-time driver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOptions {
    pub aligner: AlignerChoice,
    pub cost_weights: CostWeights,
    pub accuracy_weights: AccuracyWeights,
    pub rhythm_thresholds: RhythmThresholds,
    pub tempo_thresholds: TempoThresholds,
    pub realtime: RealTimeOptions,
    /// `T_max` in §4.2: timing cost normalization cap, in ms.
    pub timing_cost_cap_ms: f64,
    /// Sakoe–Chiba band width; `None` means derive `max(32, 0.1 * |P|)`.
    pub band_width: Option<usize>,
    /// Gap penalty `g` for Needleman–Wunsch (§4.4).
    pub gap_penalty: f64,
    /// Average DTW cost above which alignment is declared a catastrophe (§4.5).
    pub catastrophe_threshold: f64,
    /// Grace-note timing tolerance for ornament reclassification (§4.5 step 5), in ms.
    pub grace_tolerance_ms: f64,
    /// Extra-note "disruptive" thresholds (§4.6).
    pub extra_note_velocity_threshold: u8,
    pub extra_note_duration_threshold_ms: f64,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            aligner: AlignerChoice::default(),
            cost_weights: CostWeights::default(),
            accuracy_weights: AccuracyWeights::default(),
            rhythm_thresholds: RhythmThresholds::default(),
            tempo_thresholds: TempoThresholds::default(),
            realtime: RealTimeOptions::default(),
            timing_cost_cap_ms: 500.0,
            band_width: None,
            gap_penalty: 0.8,
            catastrophe_threshold: 0.9,
            grace_tolerance_ms: 120.0,
            extra_note_velocity_threshold: 40,
            extra_note_duration_threshold_ms: 50.0,
        }
    }
}

impl EvaluationOptions {
    /// Effective Sakoe–Chiba band width for a performance sequence of `perf_len` notes.
    #[must_use]
    pub fn effective_band_width(&self, perf_len: usize) -> usize {
        self.band_width.unwrap_or_else(|| (0.1 * perf_len as f64).ceil().max(32.0) as usize)
    }

    /// Load options from a TOML document.
    ///
    /// # Errors
    /// Returns an error if the TOML cannot be parsed.
    pub fn from_toml_str(content: &str) -> Result<Self, EvalError> {
        toml::from_str(content).map_err(|e| EvalError::InvalidInput(format!("toml parse: {e}")))
    }

    /// Serialize options to a TOML document.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, EvalError> {
        toml::to_string_pretty(self).map_err(|e| EvalError::InvalidInput(format!("toml serialize: {e}")))
    }

    /// Load options from a JSON document.
    ///
    /// # Errors
    /// Returns an error if the JSON cannot be parsed.
    pub fn from_json_str(content: &str) -> Result<Self, EvalError> {
        serde_json::from_str(content).map_err(|e| EvalError::InvalidInput(format!("json parse: {e}")))
    }

    /// Serialize options to a JSON document.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> Result<String, EvalError> {
        serde_json::to_string_pretty(self).map_err(|e| EvalError::InvalidInput(format!("json serialize: {e}")))
    }

    /// Validate that weights and thresholds are in sane ranges.
    ///
    /// # Errors
    /// Returns an error describing the first invalid value found.
    pub fn validate(&self) -> Result<(), EvalError> {
        if self.timing_cost_cap_ms <= 0.0 {
            return Err(EvalError::InvalidInput("timing_cost_cap_ms must be > 0".into()));
        }
        if self.gap_penalty < 0.0 {
            return Err(EvalError::InvalidInput("gap_penalty must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&self.catastrophe_threshold) {
            return Err(EvalError::InvalidInput("catastrophe_threshold must be in [0, 1]".into()));
        }
        let r = &self.rhythm_thresholds;
        if !(r.on_time_ms < r.slight_ms && r.slight_ms < r.extreme_ms) {
            return Err(EvalError::InvalidInput(
                "rhythm thresholds must satisfy on_time < slight < extreme".into(),
            ));
        }
        Ok(())
    }
}
