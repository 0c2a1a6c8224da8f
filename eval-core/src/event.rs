//! Immutable note/pedal event model shared by score and performance data
//! (spec.md §3, §9 "inheritance between ScoreNote/PerformanceNote and a
//! shared base"). Rather than an inheritance hierarchy, [`ScoreNote`] and
//! [`crate::performance::PerformanceNote`] each embed a [`NoteEvent`] value;
//! code that only needs the common fields accepts `&NoteEvent`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 12-name sharp spelling, used by [`NoteEvent::note_name`] (spec.md §6).
const NOTE_NAMES: [&str; 12] =
    ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// The common, immutable timing/pitch record for a single note.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI pitch, 0-127.
    pub pitch: u8,
    /// MIDI velocity, 0-127.
    pub velocity: u8,
    /// Tick position at which the note starts.
    pub start_tick: i64,
    /// Duration in ticks; invariant: >= 0.
    pub duration_ticks: i64,
    /// Wall/score-relative start time in milliseconds.
    pub start_ms: f64,
    /// Duration in milliseconds.
    pub duration_ms: f64,
    /// MIDI channel, 0-15.
    pub channel: u8,
    /// Voice assignment (small non-negative index).
    pub voice: u8,
}

impl NoteEvent {
    /// Pitch class (chroma), 0-11.
    #[must_use]
    pub const fn pitch_class(&self) -> u8 {
        self.pitch % 12
    }

    /// Octave, using the convention MIDI 60 = C4.
    #[must_use]
    pub const fn octave(&self) -> i32 {
        (self.pitch as i32) / 12 - 1
    }

    /// End time in milliseconds (`start_ms + duration_ms`).
    #[must_use]
    pub fn end_ms(&self) -> f64 {
        self.start_ms + self.duration_ms
    }

    /// Bit-exact note-name spelling, e.g. MIDI 60 -> `"C4"` (spec.md §6).
    #[must_use]
    pub fn note_name(&self) -> NoteName {
        NoteName { pitch: self.pitch }
    }

    /// `true` if `other` is an octave transposition of `self` (same pitch
    /// class, exactly +/-12 semitones away).
    #[must_use]
    pub fn is_octave_of(&self, other_pitch: u8) -> bool {
        (i32::from(self.pitch) - i32::from(other_pitch)).abs() == 12
            && self.pitch_class() == other_pitch % 12
    }
}

/// Bit-exact note name formatter: `{C,C#,D,...,B}` + octave, MIDI 60 = "C4".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteName {
    pitch: u8,
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = NOTE_NAMES[(self.pitch % 12) as usize];
        let octave = i32::from(self.pitch) / 12 - 1;
        write!(f, "{name}{octave}")
    }
}

/// Dynamic level bucketed from a MIDI velocity (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dynamic {
    Silent,
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
}

impl Dynamic {
    /// Bucket a MIDI velocity (0-127) into a dynamic level. Bit-exact table:
    /// 0 silent; 1-31 pp; 32-47 p; 48-63 mp; 64-79 mf; 80-95 f; 96-127 ff.
    #[must_use]
    pub const fn from_velocity(velocity: u8) -> Self {
        match velocity {
            0 => Self::Silent,
            1..=31 => Self::Pp,
            32..=47 => Self::P,
            48..=63 => Self::Mp,
            64..=79 => Self::Mf,
            80..=95 => Self::F,
            _ => Self::Ff,
        }
    }
}

/// Rhythmic value bucketed from a duration expressed in quarter notes
/// (`duration_ticks / ppq`). Includes triplet variants per spec.md §3;
/// the non-triplet bucket boundaries are the bit-exact table in spec.md §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RhythmicValue {
    Whole,
    DottedHalf,
    Half,
    DottedQuarter,
    Quarter,
    DottedEighth,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
    WholeTriplet,
    HalfTriplet,
    QuarterTriplet,
    EighthTriplet,
    SixteenthTriplet,
}

impl RhythmicValue {
    /// Bucket `duration_ticks / ppq` (quarter notes) into a non-tuplet
    /// rhythmic value using the bit-exact boundaries of spec.md §6.
    #[must_use]
    pub fn from_quarters(quarters: f64) -> Self {
        if quarters >= 3.8 {
            Self::Whole
        } else if quarters >= 2.8 {
            Self::DottedHalf
        } else if quarters >= 1.8 {
            Self::Half
        } else if quarters >= 1.4 {
            Self::DottedQuarter
        } else if quarters >= 0.9 {
            Self::Quarter
        } else if quarters >= 0.7 {
            Self::DottedEighth
        } else if quarters >= 0.45 {
            Self::Eighth
        } else if quarters >= 0.2 {
            Self::Sixteenth
        } else if quarters >= 0.1 {
            Self::ThirtySecond
        } else {
            Self::SixtyFourth
        }
    }
}
