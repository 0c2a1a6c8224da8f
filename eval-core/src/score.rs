//! Score container: the immutable ground truth a performance is compared
//! against (spec.md §3, §4.1).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::EvalError;
use crate::event::NoteEvent;
use crate::tempo::{TempoMap, TempoMarking, TimeSignature};

/// Opaque, stable identifier for a [`ScoreNote`]. Generated by
/// [`ScoreBuilder`], never reused across builders (REDESIGN FLAGS §9:
/// mutable stable identity via references is replaced by opaque ids).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScoreNoteId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraceType {
    Acciaccatura,
    Appoggiatura,
    Group,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TupletInfo {
    pub actual: u8,
    pub normal: u8,
    pub position: u8,
    pub group_size: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Articulation {
    Normal,
    Staccato,
    Staccatissimo,
    Tenuto,
    Accent,
    Marcato,
    Legato,
    Portato,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedDynamic {
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Staff {
    Right,
    Left,
}

/// A note as it appears in the ground-truth score. Embeds a [`NoteEvent`]
/// rather than inheriting from it (REDESIGN FLAGS §9).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreNote {
    pub id: ScoreNoteId,
    pub event: NoteEvent,
    pub measure: u32,
    pub beat: f64,
    pub rhythmic_value: crate::event::RhythmicValue,
    pub is_grace_note: bool,
    pub grace_type: Option<GraceType>,
    pub parent_note_id: Option<ScoreNoteId>,
    pub is_tuplet: bool,
    pub tuplet_info: Option<TupletInfo>,
    pub tie_prev: bool,
    pub tie_next: bool,
    pub articulation: Articulation,
    pub expected_dynamic: ExpectedDynamic,
    pub staff: Staff,
}

impl ScoreNote {
    #[must_use]
    pub fn pitch(&self) -> u8 {
        self.event.pitch
    }
}

/// Ordered, validated, immutable score (spec.md §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Score {
    pub notes: Vec<ScoreNote>,
    pub ppq: i64,
    pub time_signatures: Vec<TimeSignature>,
    pub tempo_markings: Vec<TempoMarking>,
    pub pickup_beats: f64,
    pub first_downbeat_tick: i64,
    pub total_measures: u32,
    tempo_map: TempoMap,
    /// Non-fatal validation warnings collected at build time (overlapping
    /// same-pitch notes, grace notes lacking a parent).
    pub warnings: Vec<String>,
}

impl Score {
    /// Binary-search for the score note at tick-sorted index `index`.
    #[must_use]
    pub fn note_at(&self, index: usize) -> Option<&ScoreNote> {
        self.notes.get(index)
    }

    /// All notes whose `start_tick` falls in `[start, end)`.
    #[must_use]
    pub fn notes_in_tick_range(&self, start: i64, end: i64) -> &[ScoreNote] {
        let lo = self.notes.partition_point(|n| n.event.start_tick < start);
        let hi = self.notes.partition_point(|n| n.event.start_tick < end);
        &self.notes[lo..hi]
    }

    /// All notes in the given 1-indexed measure.
    #[must_use]
    pub fn notes_in_measure(&self, measure: u32) -> Vec<&ScoreNote> {
        self.notes.iter().filter(|n| n.measure == measure).collect()
    }

    #[must_use]
    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    #[must_use]
    pub fn tick_to_ms(&self, tick: i64) -> f64 {
        self.tempo_map.tick_to_ms(tick)
    }

    #[must_use]
    pub fn ms_to_tick(&self, ms: f64) -> i64 {
        self.tempo_map.ms_to_tick(ms)
    }

    #[must_use]
    pub fn find(&self, id: ScoreNoteId) -> Option<&ScoreNote> {
        self.notes.iter().find(|n| n.id == id)
    }
}

/// Builds a validated [`Score`] from raw note specifications, assigning
/// stable [`ScoreNoteId`]s as it goes.
///
/// Validation (spec.md §4.1, run at build time):
/// - rejects `ppq <= 0`;
/// - warns on overlapping same-pitch notes;
/// - warns on grace notes lacking a parent;
/// - fails hard if a grace note's `parent_note_id` does not resolve.
pub struct ScoreBuilder {
    ppq: i64,
    time_signatures: Vec<TimeSignature>,
    tempo_markings: Vec<TempoMarking>,
    pickup_beats: f64,
    first_downbeat_tick: i64,
    total_measures: u32,
    next_id: AtomicU64,
    pending: Vec<PendingNote>,
}

struct PendingNote {
    id: ScoreNoteId,
    event: NoteEvent,
    measure: u32,
    beat: f64,
    rhythmic_value: crate::event::RhythmicValue,
    is_grace_note: bool,
    grace_type: Option<GraceType>,
    parent_note_id: Option<ScoreNoteId>,
    is_tuplet: bool,
    tuplet_info: Option<TupletInfo>,
    tie_prev: bool,
    tie_next: bool,
    articulation: Articulation,
    expected_dynamic: ExpectedDynamic,
    staff: Staff,
}

impl ScoreBuilder {
    #[must_use]
    pub fn new(ppq: i64) -> Self {
        Self {
            ppq,
            time_signatures: vec![TimeSignature { start_tick: 0, numerator: 4, denominator: 4 }],
            tempo_markings: vec![TempoMarking { start_tick: 0, microseconds_per_quarter: 500_000 }],
            pickup_beats: 0.0,
            first_downbeat_tick: 0,
            total_measures: 0,
            next_id: AtomicU64::new(1),
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn time_signatures(mut self, sigs: Vec<TimeSignature>) -> Self {
        self.time_signatures = sigs;
        self
    }

    #[must_use]
    pub fn tempo_markings(mut self, markings: Vec<TempoMarking>) -> Self {
        self.tempo_markings = markings;
        self
    }

    #[must_use]
    pub fn total_measures(mut self, measures: u32) -> Self {
        self.total_measures = measures;
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_note(
        &mut self,
        event: NoteEvent,
        measure: u32,
        beat: f64,
        is_grace_note: bool,
        grace_type: Option<GraceType>,
        parent_note_id: Option<ScoreNoteId>,
        is_tuplet: bool,
        tuplet_info: Option<TupletInfo>,
        articulation: Articulation,
        staff: Staff,
    ) -> ScoreNoteId {
        let id = ScoreNoteId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let rhythmic_value = crate::event::RhythmicValue::from_quarters(event.duration_ticks as f64 / self.ppq as f64);
        self.pending.push(PendingNote {
            id,
            event,
            measure,
            beat,
            rhythmic_value,
            is_grace_note,
            grace_type,
            parent_note_id,
            is_tuplet,
            tuplet_info,
            tie_prev: false,
            tie_next: false,
            articulation,
            expected_dynamic: ExpectedDynamic::Mf,
            staff,
        });
        id
    }

    /// Finalize the score.
    ///
    /// # Errors
    /// Returns [`EvalError::InvalidPpq`] if `ppq <= 0`, or
    /// [`EvalError::UnresolvedGraceParent`] if a grace note's parent id
    /// does not resolve to a note in this score.
    pub fn build(self) -> Result<Score, EvalError> {
        if self.ppq <= 0 {
            return Err(EvalError::InvalidPpq(self.ppq));
        }

        let mut notes: Vec<ScoreNote> = self
            .pending
            .into_iter()
            .map(|p| ScoreNote {
                id: p.id,
                event: p.event,
                measure: p.measure,
                beat: p.beat,
                rhythmic_value: p.rhythmic_value,
                is_grace_note: p.is_grace_note,
                grace_type: p.grace_type,
                parent_note_id: p.parent_note_id,
                is_tuplet: p.is_tuplet,
                tuplet_info: p.tuplet_info,
                tie_prev: p.tie_prev,
                tie_next: p.tie_next,
                articulation: p.articulation,
                expected_dynamic: p.expected_dynamic,
                staff: p.staff,
            })
            .collect();

        notes.sort_by_key(|n| (n.event.start_tick, n.event.pitch));

        let valid_ids: std::collections::HashSet<ScoreNoteId> = notes.iter().map(|n| n.id).collect();
        let mut warnings = Vec::new();
        for note in &notes {
            if note.is_grace_note {
                match note.parent_note_id {
                    None => warnings.push(format!("grace note {} has no parent_note_id", note.id.0)),
                    Some(parent) if !valid_ids.contains(&parent) => {
                        return Err(EvalError::UnresolvedGraceParent { grace_id: note.id.0, parent_id: parent.0 });
                    }
                    Some(_) => {}
                }
            }
        }
        for pair in notes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.event.pitch == b.event.pitch && a.event.end_ms() > b.event.start_ms && a.event.start_tick != b.event.start_tick {
                warnings.push(format!("overlapping same-pitch notes {} and {}", a.id.0, b.id.0));
            }
        }

        let tempo_map = TempoMap::new(self.ppq, self.tempo_markings.clone());

        Ok(Score {
            notes,
            ppq: self.ppq,
            time_signatures: self.time_signatures,
            tempo_markings: self.tempo_markings,
            pickup_beats: self.pickup_beats,
            first_downbeat_tick: self.first_downbeat_tick,
            total_measures: self.total_measures,
            tempo_map,
            warnings,
        })
    }
}
