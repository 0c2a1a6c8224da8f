//! Performance container: the played events a score is compared against
//! (spec.md §3). Alignment-assigned fields live on [`crate::align::AlignedNotePair`],
//! not here — `PerformanceNote` stays pure input data (REDESIGN FLAGS §9).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::NoteEvent;

/// Opaque, stable identifier for a [`PerformanceNote`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PerformanceNoteId(pub u64);

/// A note as captured live or loaded from a recorded performance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceNote {
    pub id: PerformanceNoteId,
    pub event: NoteEvent,
    pub received_timestamp_ms: f64,
    pub release_velocity: Option<u8>,
    pub sustain_active: bool,
    pub soft_active: bool,
    pub sostenuto_active: bool,
    pub sequence_index: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PedalKind {
    Sustain,
    Soft,
    Sostenuto,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PedalEvent {
    pub time_ms: f64,
    pub is_pressed: bool,
    pub value: u8,
}

/// Ordered performance notes plus the three pedal channels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Performance {
    pub notes: Vec<PerformanceNote>,
    pub sustain_events: Vec<PedalEvent>,
    pub soft_events: Vec<PedalEvent>,
    pub sostenuto_events: Vec<PedalEvent>,
}

impl Performance {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    #[must_use]
    pub fn find(&self, id: PerformanceNoteId) -> Option<&PerformanceNote> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Value of the latest pedal event at or before `t`, for the given kind.
    #[must_use]
    pub fn is_active_at(&self, kind: PedalKind, t: f64) -> bool {
        let events = match kind {
            PedalKind::Sustain => &self.sustain_events,
            PedalKind::Soft => &self.soft_events,
            PedalKind::Sostenuto => &self.sostenuto_events,
        };
        events.iter().rev().find(|e| e.time_ms <= t).is_some_and(|e| e.is_pressed)
    }

    /// First pedal-off at or after `t`; `None` if the pedal never releases.
    #[must_use]
    pub fn next_pedal_off(&self, kind: PedalKind, t: f64) -> Option<f64> {
        let events = match kind {
            PedalKind::Sustain => &self.sustain_events,
            PedalKind::Soft => &self.soft_events,
            PedalKind::Sostenuto => &self.sostenuto_events,
        };
        events.iter().find(|e| e.time_ms >= t && !e.is_pressed).map(|e| e.time_ms)
    }

    /// Effective end time of a note, extended to the next sustain-pedal-off
    /// if the pedal was active at the note's start (spec.md §4.5 step 7).
    #[must_use]
    pub fn effective_end_ms(&self, note: &PerformanceNote) -> f64 {
        let natural_end = note.event.end_ms();
        if note.sustain_active {
            self.next_pedal_off(PedalKind::Sustain, natural_end).unwrap_or(natural_end).max(natural_end)
        } else {
            natural_end
        }
    }
}

/// Incrementally builds a [`Performance`] from live note-on/note-off/pedal
/// events (spec.md §6 ingest interface), or from a batch of pre-recorded
/// notes. Assigns stable ids and a monotonic `sequence_index`.
pub struct PerformanceBuilder {
    notes: Vec<PerformanceNote>,
    sustain_events: Vec<PedalEvent>,
    soft_events: Vec<PedalEvent>,
    sostenuto_events: Vec<PedalEvent>,
    next_id: AtomicU64,
    next_sequence: u64,
    open_notes: Vec<usize>,
    sustain_active: bool,
    soft_active: bool,
    sostenuto_active: bool,
}

impl Default for PerformanceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            notes: Vec::new(),
            sustain_events: Vec::new(),
            soft_events: Vec::new(),
            sostenuto_events: Vec::new(),
            next_id: AtomicU64::new(1),
            next_sequence: 0,
            open_notes: Vec::new(),
            sustain_active: false,
            soft_active: false,
            sostenuto_active: false,
        }
    }

    /// Record a note-on. `start_tick`/`duration_ticks` default to 0 since
    /// live capture has no score-tick frame of reference; callers that load
    /// a recorded performance with known ticks should populate those via
    /// [`Self::push_note`] instead.
    pub fn on_note_on(&mut self, pitch: u8, velocity: u8, time_ms: f64) -> PerformanceNoteId {
        let id = PerformanceNoteId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let sequence_index = self.next_sequence;
        self.next_sequence += 1;
        let event = NoteEvent {
            pitch,
            velocity,
            start_tick: 0,
            duration_ticks: 0,
            start_ms: time_ms,
            duration_ms: 0.0,
            channel: 0,
            voice: 0,
        };
        self.notes.push(PerformanceNote {
            id,
            event,
            received_timestamp_ms: time_ms,
            release_velocity: None,
            sustain_active: self.sustain_active,
            soft_active: self.soft_active,
            sostenuto_active: self.sostenuto_active,
            sequence_index,
        });
        self.open_notes.push(self.notes.len() - 1);
        id
    }

    /// Record a note-off, closing the most recent matching open note.
    pub fn on_note_off(&mut self, pitch: u8, time_ms: f64, release_velocity: Option<u8>) {
        if let Some(pos) = self.open_notes.iter().rposition(|&i| self.notes[i].event.pitch == pitch) {
            let idx = self.open_notes.remove(pos);
            let note = &mut self.notes[idx];
            note.event.duration_ms = (time_ms - note.event.start_ms).max(0.0);
            note.release_velocity = release_velocity;
        }
    }

    /// Record a pedal event.
    pub fn on_pedal(&mut self, kind: PedalKind, value: u8, time_ms: f64) {
        let is_pressed = value > 0;
        let event = PedalEvent { time_ms, is_pressed, value };
        match kind {
            PedalKind::Sustain => {
                self.sustain_active = is_pressed;
                self.sustain_events.push(event);
            }
            PedalKind::Soft => {
                self.soft_active = is_pressed;
                self.soft_events.push(event);
            }
            PedalKind::Sostenuto => {
                self.sostenuto_active = is_pressed;
                self.sostenuto_events.push(event);
            }
        }
    }

    /// Insert a fully-formed note directly (used when loading a recorded
    /// performance that already carries tick/duration information).
    pub fn push_note(&mut self, event: NoteEvent, received_timestamp_ms: f64) -> PerformanceNoteId {
        let id = PerformanceNoteId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let sequence_index = self.next_sequence;
        self.next_sequence += 1;
        self.notes.push(PerformanceNote {
            id,
            event,
            received_timestamp_ms,
            release_velocity: None,
            sustain_active: self.sustain_active,
            soft_active: self.soft_active,
            sostenuto_active: self.sostenuto_active,
            sequence_index,
        });
        id
    }

    #[must_use]
    pub fn build(mut self) -> Performance {
        self.notes.sort_by(|a, b| a.event.start_ms.partial_cmp(&b.event.start_ms).unwrap());
        Performance {
            notes: self.notes,
            sustain_events: self.sustain_events,
            soft_events: self.soft_events,
            sostenuto_events: self.sostenuto_events,
        }
    }
}
