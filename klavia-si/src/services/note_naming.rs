//! Pitch naming and localization
//!
//! Maps a notated pitch (letter step, signed alteration, octave) to its MIDI
//! number, canonical name ("F#4") and locale step name ("Fa#4"). The locale
//! table is fixed: one target-language string per letter A–G, with the
//! accidental symbol and octave appended unchanged.

/// Locale step-name translation table (French solfège)
const STEP_NAMES_FR: [(char, &str); 7] = [
    ('C', "Do"),
    ('D', "Ré"),
    ('E', "Mi"),
    ('F', "Fa"),
    ('G', "Sol"),
    ('A', "La"),
    ('B', "Si"),
];

/// Semitone offset of a letter step within the octave (C = 0)
///
/// Returns None for anything outside A–G.
pub fn semitone_for_step(step: char) -> Option<i32> {
    match step.to_ascii_uppercase() {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

/// MIDI note number for a notated pitch
///
/// Scientific pitch octaves: C4 = 60, so `midi = (octave + 1) * 12 +
/// semitone + alteration`.
pub fn midi_number(step: char, alteration: i32, octave: i32) -> Option<i32> {
    let semitone = semitone_for_step(step)?;
    Some((octave + 1) * 12 + semitone + alteration)
}

/// Accidental display symbol for a signed semitone alteration
///
/// Single and double sharps/flats map to symbols; larger magnitudes have no
/// notated symbol and render as the bare letter.
pub fn accidental_symbol(alteration: i32) -> &'static str {
    match alteration {
        1 => "#",
        -1 => "b",
        2 => "##",
        -2 => "bb",
        _ => "",
    }
}

/// Canonical note name: letter + accidental symbol + octave, e.g. "F#4"
pub fn canonical_name(step: char, alteration: i32, octave: i32) -> String {
    format!(
        "{}{}{}",
        step.to_ascii_uppercase(),
        accidental_symbol(alteration),
        octave
    )
}

/// Locale note name: translated step + accidental symbol + octave, e.g. "Fa#4"
///
/// Unknown steps fall back to the untranslated letter.
pub fn localized_name(step: char, alteration: i32, octave: i32) -> String {
    let upper = step.to_ascii_uppercase();
    let translated = STEP_NAMES_FR
        .iter()
        .find(|(letter, _)| *letter == upper)
        .map(|(_, name)| *name);

    match translated {
        Some(name) => format!("{}{}{}", name, accidental_symbol(alteration), octave),
        None => canonical_name(step, alteration, octave),
    }
}
