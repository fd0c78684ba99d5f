//! Flattened note-event sequence handed to the game client
//!
//! One `NoteEvent` per sounding element in score order. Chords are collapsed
//! to a single representative event (top voice) before they reach this model.

use serde::{Deserialize, Serialize};

/// One sounding event in the flattened score
///
/// `sequence_index` is a dense 0-based index over the produced sequence; it
/// is not the element's position in the original voice/part structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    /// Dense 0-based position in the output sequence
    pub sequence_index: usize,

    /// Pitch letter name, A–G
    pub pitch_step: char,

    /// Scientific pitch octave (C4 = middle C)
    pub octave: i32,

    /// Signed semitone offset from the notated accidental (0 if none)
    pub alteration: i32,

    /// MIDI note number of the representative pitch
    pub midi_number: i32,

    /// Letter + accidental symbol + octave, e.g. "F#4"
    pub canonical_name: String,

    /// Locale step name with the accidental symbol and octave appended,
    /// e.g. "Fa#4"
    pub localized_name: String,

    /// Notated duration in quarter-note lengths
    pub duration_quarter_lengths: f64,

    /// Symbolic duration category, e.g. "quarter", "eighth"
    pub rhythmic_type: String,

    /// Tempo applying to the whole extracted sequence, repeated per event
    /// for the game client's convenience
    #[serde(rename = "referenceTempoBPM")]
    pub reference_tempo_bpm: f64,

    /// True when this event stands in for a multi-pitch chord
    pub is_chord: bool,

    /// Reserved in the payload schema; emitted events are always sounding
    pub is_rest: bool,
}

/// Canonical extraction artifact: tempo plus the ordered event sequence
///
/// Persisted as a JSON side file next to the score archive and addressed
/// only through its owning score record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedScore {
    /// Reference tempo for the whole sequence, beats per minute
    #[serde(rename = "referenceTempoBPM")]
    pub reference_tempo_bpm: f64,

    /// Events in score order, `sequence_index` values exactly `0..n`
    pub ordered_sequence: Vec<NoteEvent>,
}

impl ExtractedScore {
    /// Serialize to the persisted JSON document form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse the persisted JSON document form
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
