//! Real-time evaluation driver (spec.md §4.9, §5, §6).
//!
//! Owns a bounded FIFO of recently captured performance notes and runs a
//! windowed alignment against the score each time enough new notes have
//! accumulated. Runs single-threaded on the caller's event thread:
//! `on_note_on`/`on_note_off`/`on_pedal` never block and never panic —
//! internal failures become a [`RealTimeError`] handed to the `on_error`
//! callback instead of propagating (REDESIGN FLAGS §9: constructor-injected
//! callbacks replace a global event broadcast).

use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::align::hybrid;
use crate::config::EvaluationOptions;
use crate::error::Issue;
use crate::event::NoteEvent;
use crate::evaluate::{self, EvaluationResult};
use crate::performance::{PedalKind, Performance, PerformanceBuilder, PerformanceNote, PerformanceNoteId};
use crate::score::Score;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Idle,
    Running,
    Stopped,
}

/// Feedback emitted after a triggered windowed alignment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RealTimeFeedback {
    pub cursor: usize,
    pub timing_message: String,
    pub issues: Vec<Issue>,
}

/// A performance note that could not be matched to any score candidate in
/// the active window, surfaced synchronously.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RealTimeError {
    pub performance_note_id: PerformanceNoteId,
    pub pitch: u8,
    pub time_ms: f64,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Progress {
    pub current_measure: u32,
    pub score_position: usize,
    pub progress_percent: f64,
    pub recent_feedback: Vec<RealTimeFeedback>,
}

/// Single-threaded, cooperative driver for live MIDI capture (spec.md §4.9).
///
/// `on_feedback`/`on_error` are constructor-injected callbacks rather than a
/// global broadcast (REDESIGN FLAGS §9).
pub struct RealTimeDriver<F, E>
where
    F: FnMut(RealTimeFeedback),
    E: FnMut(RealTimeError),
{
    score: Score,
    options: EvaluationOptions,
    state: DriverState,
    t0_ms: Option<f64>,
    buffer: VecDeque<PerformanceNote>,
    all_notes: Vec<PerformanceNote>,
    builder: PerformanceBuilder,
    cursor: usize,
    last_emission_ms: Option<f64>,
    recent_feedback: Vec<RealTimeFeedback>,
    next_sequence: u64,
    on_feedback: F,
    on_error: E,
}

impl<F, E> RealTimeDriver<F, E>
where
    F: FnMut(RealTimeFeedback),
    E: FnMut(RealTimeError),
{
    #[must_use]
    pub fn new(score: Score, options: EvaluationOptions, on_feedback: F, on_error: E) -> Self {
        Self {
            score,
            options,
            state: DriverState::Idle,
            t0_ms: None,
            buffer: VecDeque::new(),
            all_notes: Vec::new(),
            builder: PerformanceBuilder::new(),
            cursor: 0,
            last_emission_ms: None,
            recent_feedback: Vec::new(),
            next_sequence: 0,
            on_feedback,
            on_error,
        }
    }

    pub fn start(&mut self, t0_ms: f64) {
        self.t0_ms = Some(t0_ms);
        self.state = DriverState::Running;
    }

    pub fn stop(&mut self) {
        self.state = DriverState::Stopped;
        self.buffer.clear();
    }

    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn on_note_on(&mut self, pitch: u8, velocity: u8, time_ms: f64) {
        if self.state != DriverState::Running {
            return;
        }
        let id = self.builder.on_note_on(pitch, velocity, time_ms);
        let sequence_index = self.next_sequence;
        self.next_sequence += 1;
        let note = PerformanceNote {
            id,
            event: NoteEvent { pitch, velocity, start_tick: 0, duration_ticks: 0, start_ms: time_ms, duration_ms: 0.0, channel: 0, voice: 0 },
            received_timestamp_ms: time_ms,
            release_velocity: None,
            sustain_active: false,
            soft_active: false,
            sostenuto_active: false,
            sequence_index,
        };
        self.all_notes.push(note.clone());
        self.buffer.push_back(note);

        if let Some(err) = self.check_for_mismatch(pitch, time_ms) {
            (self.on_error)(err);
        }

        self.maybe_trigger(time_ms);
    }

    pub fn on_note_off(&mut self, pitch: u8, time_ms: f64, release_velocity: Option<u8>) {
        if self.state != DriverState::Running {
            return;
        }
        self.builder.on_note_off(pitch, time_ms, release_velocity);
        for note in self.buffer.iter_mut().rev() {
            if note.event.pitch == pitch && note.event.duration_ms == 0.0 {
                note.event.duration_ms = (time_ms - note.event.start_ms).max(0.0);
                note.release_velocity = release_velocity;
                break;
            }
        }
        for note in self.all_notes.iter_mut().rev() {
            if note.event.pitch == pitch && note.event.duration_ms == 0.0 {
                note.event.duration_ms = (time_ms - note.event.start_ms).max(0.0);
                note.release_velocity = release_velocity;
                break;
            }
        }
    }

    pub fn on_pedal(&mut self, kind: PedalKind, value: u8, time_ms: f64) {
        if self.state != DriverState::Running {
            return;
        }
        self.builder.on_pedal(kind, value, time_ms);
    }

    /// Window of score notes `[cursor-2, cursor+lookahead]`, clamped to bounds.
    fn window_candidates(&self) -> &[crate::score::ScoreNote] {
        let lookahead = self.options.realtime.lookahead;
        let lo = self.cursor.saturating_sub(2);
        let hi = (self.cursor + lookahead + 1).min(self.score.notes.len());
        if lo >= hi {
            &[]
        } else {
            &self.score.notes[lo..hi]
        }
    }

    /// Matches an incoming note against the current window by pitch or
    /// pitch class within the mismatch window; `None` means no mismatch.
    fn check_for_mismatch(&self, pitch: u8, time_ms: f64) -> Option<RealTimeError> {
        let window = self.options.realtime.mismatch_window_ms;
        let candidates = self.window_candidates();
        let matches_any = candidates.iter().any(|n| {
            (n.event.pitch == pitch || n.event.pitch_class() == pitch % 12) && (n.event.start_ms - time_ms).abs() <= window
        });
        if matches_any || candidates.is_empty() {
            return None;
        }
        let last = self.all_notes.last()?;
        Some(RealTimeError {
            performance_note_id: last.id,
            pitch,
            time_ms,
            message: format!("no candidate for pitch {pitch} in the current window"),
        })
    }

    fn maybe_trigger(&mut self, now_ms: f64) {
        let min_window = self.options.realtime.min_window;
        if self.buffer.len() < min_window {
            return;
        }
        let interval_elapsed = self.last_emission_ms.is_none_or(|t| now_ms - t >= self.options.realtime.min_feedback_interval_ms);
        if !interval_elapsed {
            return;
        }

        let candidates = self.window_candidates();
        if candidates.is_empty() {
            return;
        }
        let window_score_notes: Vec<_> = candidates.to_vec();
        let window_perf_notes: Vec<PerformanceNote> = self.buffer.iter().cloned().collect();

        let window_score = build_window_score(&self.score, &window_score_notes);
        let window_performance = build_window_performance(&window_perf_notes);
        let alignment = hybrid::align(&window_score, &window_performance, &self.options);

        let highest_matched = alignment.pairs.iter().filter_map(|p| window_score_notes.iter().position(|n| n.id == p.score_note_id)).max();
        if let Some(local_idx) = highest_matched {
            let global_idx = self.cursor.saturating_sub(2) + local_idx;
            self.cursor = (global_idx + 1).min(self.score.notes.len());
        }

        let result = evaluate::run_all(&alignment, &window_score, &window_performance, &self.options);
        let mut issues: Vec<Issue> = Vec::new();
        issues.extend(result.note_accuracy.issues.clone());
        issues.extend(result.rhythm.issues.clone());
        issues.extend(result.tempo.issues.clone());
        issues.sort_by_key(|i| std::cmp::Reverse(i.severity));

        let timing_message = if result.rhythm.mean_deviation_ms.abs() > self.options.rhythm_thresholds.slight_ms {
            format!("average timing deviation {:.0}ms", result.rhythm.mean_deviation_ms)
        } else {
            String::new()
        };

        if !issues.is_empty() || !timing_message.is_empty() {
            let feedback = RealTimeFeedback { cursor: self.cursor, timing_message, issues };
            self.recent_feedback.push(feedback.clone());
            (self.on_feedback)(feedback);
            self.last_emission_ms = Some(now_ms);

            let evict = min_window / 2;
            for _ in 0..evict {
                if self.buffer.pop_front().is_none() {
                    break;
                }
            }
        }
        debug!("real-time trigger evaluated, cursor now {}", self.cursor);
    }

    #[must_use]
    pub fn get_progress(&self) -> Progress {
        let current_measure = self.score.notes.get(self.cursor.min(self.score.notes.len().saturating_sub(1))).map_or(1, |n| n.measure);
        let progress_percent = if self.score.notes.is_empty() { 100.0 } else { 100.0 * self.cursor as f64 / self.score.notes.len() as f64 };
        Progress {
            current_measure,
            score_position: self.cursor,
            progress_percent: progress_percent.min(100.0),
            recent_feedback: self.recent_feedback.clone(),
        }
    }

    #[must_use]
    pub fn get_final_evaluation(&self) -> EvaluationResult {
        let performance = build_window_performance(&self.all_notes);
        let alignment = hybrid::align(&self.score, &performance, &self.options);
        evaluate::run_all(&alignment, &self.score, &performance, &self.options)
    }
}

fn build_window_score(score: &Score, notes: &[crate::score::ScoreNote]) -> Score {
    let mut cloned = score.clone();
    cloned.notes = notes.to_vec();
    cloned
}

fn build_window_performance(notes: &[PerformanceNote]) -> Performance {
    let mut notes = notes.to_vec();
    notes.sort_by(|a, b| a.event.start_ms.partial_cmp(&b.event.start_ms).unwrap());
    Performance { notes, sustain_events: Vec::new(), soft_events: Vec::new(), sostenuto_events: Vec::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Articulation, ScoreBuilder, Staff};

    fn scale_score() -> Score {
        let mut b = ScoreBuilder::new(480);
        let pitches = [60, 62, 64, 65, 67, 69, 71, 72];
        for (i, &p) in pitches.iter().enumerate() {
            let tick = i as i64 * 480;
            let event = NoteEvent { pitch: p, velocity: 80, start_tick: tick, duration_ticks: 480, start_ms: tick as f64 * 500.0 / 480.0, duration_ms: 500.0, channel: 0, voice: 0 };
            b.add_note(event, 1, (i + 1) as f64, false, None, None, false, None, Articulation::Normal, Staff::Right);
        }
        b.build().unwrap()
    }

    #[test]
    fn idle_driver_ignores_events() {
        let mut feedback_count = 0;
        let mut error_count = 0;
        let mut driver = RealTimeDriver::new(scale_score(), EvaluationOptions::default(), |_| feedback_count += 1, |_| error_count += 1);
        driver.on_note_on(60, 80, 0.0);
        assert_eq!(driver.get_progress().score_position, 0);
        assert_eq!(feedback_count, 0);
    }

    #[test]
    fn running_driver_advances_cursor_on_matching_notes() {
        let mut feedbacks = Vec::new();
        let mut errors = Vec::new();
        let pitches = [60, 62, 64, 65, 67, 69, 71, 72];
        {
            let mut driver = RealTimeDriver::new(scale_score(), EvaluationOptions::default(), |f| feedbacks.push(f), |e| errors.push(e));
            driver.start(0.0);
            for (i, &p) in pitches.iter().enumerate() {
                let t = i as f64 * 500.0;
                driver.on_note_on(p, 80, t);
                driver.on_note_off(p, t + 400.0, None);
            }
            let progress = driver.get_progress();
            assert!(progress.score_position > 0);
            let batch_equivalent = driver.get_final_evaluation();
            assert!(batch_equivalent.note_accuracy.score > 50.0);
        }
        assert!(errors.is_empty());
    }

    #[test]
    fn stop_is_idempotent_and_clears_buffer() {
        let mut driver = RealTimeDriver::new(scale_score(), EvaluationOptions::default(), |_| {}, |_| {});
        driver.start(0.0);
        driver.on_note_on(60, 80, 0.0);
        driver.stop();
        driver.stop();
        assert_eq!(driver.state(), DriverState::Stopped);
    }
}
