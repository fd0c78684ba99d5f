//! Score archive extraction
//!
//! Turns a compressed MusicXML archive (.mxl) into the flattened,
//! game-ready note-event sequence. Pure function of the archive bytes:
//! the same archive always produces the same sequence.
//!
//! The archive's primary notation entry is the first `.xml` entry outside
//! `META-INF/`; if every `.xml` entry lives under `META-INF/`, the first
//! one found is used as a fallback.

use crate::models::{ExtractedScore, NoteEvent};
use crate::services::note_naming;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Read, Seek};
use std::path::Path;
use thiserror::Error;

/// Tempo applied when the document carries no explicit marking
pub const DEFAULT_TEMPO_BPM: f64 = 60.0;

/// Score extraction errors
///
/// All variants are terminal for the ingestion run that hit them; nothing
/// here is retryable locally.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Archive unreadable or an entry failed to decompress
    #[error("Score archive corrupt: {0}")]
    ArchiveCorrupt(String),

    /// Archive holds no notation document at all
    #[error("No playable content: {0}")]
    NoPlayableContent(String),

    /// Notation document present but the parser failed on it
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),
}

/// Score archive extractor
pub struct ScoreExtractor;

impl ScoreExtractor {
    /// Create new score extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract the flattened note-event sequence from a score archive
    pub fn extract(&self, archive_path: &Path) -> Result<ExtractedScore, ExtractError> {
        let bytes = self.read_primary_notation(archive_path)?;
        // Audiveris exports UTF-8; tolerate stray bytes rather than abort
        let xml = String::from_utf8_lossy(&bytes);

        let score = self.extract_from_xml(&xml)?;

        tracing::debug!(
            archive = %archive_path.display(),
            events = score.ordered_sequence.len(),
            tempo_bpm = score.reference_tempo_bpm,
            "Score extraction complete"
        );

        Ok(score)
    }

    /// Raw bytes of the archive's primary notation document
    ///
    /// Also serves the notation retrieval boundary, which returns the
    /// markup verbatim without flattening it.
    pub fn read_primary_notation(&self, archive_path: &Path) -> Result<Vec<u8>, ExtractError> {
        let file = std::fs::File::open(archive_path).map_err(|e| {
            ExtractError::ArchiveCorrupt(format!("{}: {}", archive_path.display(), e))
        })?;

        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ExtractError::ArchiveCorrupt(e.to_string()))?;

        let index = primary_entry_index(&mut archive)?;

        let mut entry = archive
            .by_index(index)
            .map_err(|e| ExtractError::ArchiveCorrupt(e.to_string()))?;

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| ExtractError::ArchiveCorrupt(e.to_string()))?;

        Ok(bytes)
    }

    /// Flatten a MusicXML document into the extracted score
    pub fn extract_from_xml(&self, xml: &str) -> Result<ExtractedScore, ExtractError> {
        let parsed = parse_musicxml(xml)?;

        if parsed.part_count == 0 && parsed.groups.is_empty() {
            return Err(ExtractError::NoPlayableContent(
                "document contains no part data".to_string(),
            ));
        }

        let mut groups = parsed.groups;
        // Stable score order: time offset, then part order, then source order
        groups.sort_by(|a, b| {
            a.offset_ql
                .total_cmp(&b.offset_ql)
                .then(a.part_index.cmp(&b.part_index))
                .then(a.source_order.cmp(&b.source_order))
        });

        let tempo = parsed.tempo_bpm.unwrap_or(DEFAULT_TEMPO_BPM);

        let ordered_sequence = groups
            .into_iter()
            .enumerate()
            .map(|(index, group)| group.into_event(index, tempo))
            .collect();

        Ok(ExtractedScore {
            reference_tempo_bpm: tempo,
            ordered_sequence,
        })
    }
}

/// Index of the primary notation entry within the archive
fn primary_entry_index<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<usize, ExtractError> {
    let mut fallback = None;

    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| ExtractError::ArchiveCorrupt(e.to_string()))?;
        let name = entry.name().to_string();
        drop(entry);

        if !name.to_ascii_lowercase().ends_with(".xml") {
            continue;
        }
        if !name.starts_with("META-INF/") {
            return Ok(index);
        }
        if fallback.is_none() {
            fallback = Some(index);
        }
    }

    fallback.ok_or_else(|| {
        ExtractError::NoPlayableContent("archive contains no XML notation entry".to_string())
    })
}

/// Notated pitch resolved to its MIDI number
#[derive(Debug, Clone, Copy)]
struct Pitch {
    step: char,
    alteration: i32,
    octave: i32,
    midi: i32,
}

/// One sounding element after chord grouping: a principal note plus any
/// `<chord/>`-marked followers sharing its onset
#[derive(Debug)]
struct ChordGroup {
    part_index: usize,
    source_order: usize,
    offset_ql: f64,
    duration_ql: f64,
    rhythmic_type: Option<String>,
    principal: Pitch,
    extras: Vec<Pitch>,
}

impl ChordGroup {
    /// Collapse to the representative event: melody-led gameplay treats the
    /// top voice of a chord as the salient target pitch.
    fn into_event(self, sequence_index: usize, tempo_bpm: f64) -> NoteEvent {
        let is_chord = !self.extras.is_empty();
        let rhythmic_type = self
            .rhythmic_type
            .unwrap_or_else(|| rhythmic_type_for_quarter_length(self.duration_ql));

        let Pitch {
            step,
            alteration,
            octave,
            midi,
        } = self
            .extras
            .iter()
            .fold(self.principal, |best, &pitch| {
                if pitch.midi > best.midi {
                    pitch
                } else {
                    best
                }
            });

        NoteEvent {
            sequence_index,
            pitch_step: step,
            octave,
            alteration,
            midi_number: midi,
            canonical_name: note_naming::canonical_name(step, alteration, octave),
            localized_name: note_naming::localized_name(step, alteration, octave),
            duration_quarter_lengths: self.duration_ql,
            rhythmic_type,
            reference_tempo_bpm: tempo_bpm,
            is_chord,
            is_rest: false,
        }
    }
}

/// Raw parse result before flattening
struct ParsedScore {
    part_count: usize,
    tempo_bpm: Option<f64>,
    groups: Vec<ChordGroup>,
}

/// In-flight state for one `<note>` element
#[derive(Debug, Default)]
struct NoteBuilder {
    is_rest: bool,
    is_chord_member: bool,
    is_grace: bool,
    step: Option<char>,
    alter: f64,
    octave: Option<i32>,
    duration_divs: f64,
    rhythmic_type: Option<String>,
}

/// Streaming MusicXML parse (score-partwise)
///
/// Tracks the absolute time cursor per part in quarter-note units,
/// honoring `<divisions>`, `<backup>` and `<forward>`, and groups
/// `<chord/>`-marked notes with their principal.
fn parse_musicxml(xml: &str) -> Result<ParsedScore, ExtractError> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();

    let mut part_count: usize = 0;
    let mut divisions: f64 = 1.0;
    let mut cursor_ql: f64 = 0.0;
    let mut tempo_bpm: Option<f64> = None;

    let mut note: Option<NoteBuilder> = None;
    let mut groups: Vec<ChordGroup> = Vec::new();
    let mut source_order: usize = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                handle_element_open(&name, &e, &mut note, &mut tempo_bpm);
                if name == "part" {
                    part_count += 1;
                    divisions = 1.0;
                    cursor_ql = 0.0;
                }
                stack.push(name);
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                handle_element_open(&name, &e, &mut note, &mut tempo_bpm);
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| ExtractError::ExtractionFailed(e.to_string()))?;
                text.push_str(&value);
            }
            Ok(Event::End(_)) => {
                let name = stack.pop().unwrap_or_default();
                let parent = stack.last().map(String::as_str).unwrap_or("");
                let value = text.trim().to_string();
                text.clear();

                match name.as_str() {
                    "divisions" => {
                        if let Ok(parsed) = value.parse::<f64>() {
                            if parsed > 0.0 {
                                divisions = parsed;
                            }
                        }
                    }
                    "duration" => match (&mut note, parent) {
                        (Some(builder), _) => {
                            builder.duration_divs = value.parse::<f64>().unwrap_or(0.0);
                        }
                        (None, "backup") => {
                            cursor_ql -= value.parse::<f64>().unwrap_or(0.0) / divisions;
                        }
                        (None, "forward") => {
                            cursor_ql += value.parse::<f64>().unwrap_or(0.0) / divisions;
                        }
                        _ => {}
                    },
                    "step" => {
                        if let Some(builder) = &mut note {
                            builder.step = value.chars().next();
                        }
                    }
                    "alter" => {
                        if let Some(builder) = &mut note {
                            builder.alter = value.parse::<f64>().unwrap_or(0.0);
                        }
                    }
                    "octave" => {
                        if let Some(builder) = &mut note {
                            builder.octave = value.parse::<i32>().ok();
                        }
                    }
                    "type" => {
                        if let Some(builder) = &mut note {
                            if !value.is_empty() {
                                builder.rhythmic_type = Some(value);
                            }
                        }
                    }
                    "per-minute" => {
                        if tempo_bpm.is_none() {
                            tempo_bpm = value.parse::<f64>().ok().filter(|bpm| *bpm > 0.0);
                        }
                    }
                    "note" => {
                        if let Some(builder) = note.take() {
                            finish_note(
                                builder,
                                part_count.saturating_sub(1),
                                divisions,
                                &mut cursor_ql,
                                &mut groups,
                                &mut source_order,
                            );
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ExtractError::ExtractionFailed(format!(
                    "MusicXML parse error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }

    Ok(ParsedScore {
        part_count,
        tempo_bpm,
        groups,
    })
}

/// Shared handling for opening tags, whether self-closing or not
fn handle_element_open(
    name: &str,
    element: &quick_xml::events::BytesStart<'_>,
    note: &mut Option<NoteBuilder>,
    tempo_bpm: &mut Option<f64>,
) {
    match name {
        "note" => *note = Some(NoteBuilder::default()),
        "chord" => {
            if let Some(builder) = note {
                builder.is_chord_member = true;
            }
        }
        "rest" => {
            if let Some(builder) = note {
                builder.is_rest = true;
            }
        }
        "grace" => {
            if let Some(builder) = note {
                builder.is_grace = true;
            }
        }
        "sound" => {
            // First explicit tempo marking in document order wins
            if tempo_bpm.is_none() {
                if let Ok(Some(attr)) = element.try_get_attribute("tempo") {
                    if let Ok(value) = attr.unescape_value() {
                        *tempo_bpm = value.trim().parse::<f64>().ok().filter(|bpm| *bpm > 0.0);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Fold a completed `<note>` into the chord-group list and advance the cursor
fn finish_note(
    builder: NoteBuilder,
    part_index: usize,
    divisions: f64,
    cursor_ql: &mut f64,
    groups: &mut Vec<ChordGroup>,
    source_order: &mut usize,
) {
    // Grace notes occupy no time
    let duration_ql = if builder.is_grace {
        0.0
    } else {
        builder.duration_divs / divisions
    };

    if builder.is_rest {
        // Rests carry no playable pitch; they only advance time
        *cursor_ql += duration_ql;
        return;
    }

    let alteration = builder.alter.round() as i32;
    let pitch = match (builder.step, builder.octave) {
        (Some(step), Some(octave)) => {
            note_naming::midi_number(step, alteration, octave).map(|midi| Pitch {
                step: step.to_ascii_uppercase(),
                alteration,
                octave,
                midi,
            })
        }
        _ => None,
    };

    let Some(pitch) = pitch else {
        // Unsounding or malformed pitch: keep the timeline consistent
        if !builder.is_chord_member {
            *cursor_ql += duration_ql;
        }
        return;
    };

    if builder.is_chord_member {
        // Chord members attach to their principal; the cursor already
        // advanced when the principal was folded in
        if let Some(group) = groups
            .last_mut()
            .filter(|group| group.part_index == part_index)
        {
            group.extras.push(pitch);
            return;
        }
        // A <chord/> with no principal is malformed; treat it as a
        // standalone note rather than drop it
    }

    let offset_ql = *cursor_ql;
    groups.push(ChordGroup {
        part_index,
        source_order: *source_order,
        offset_ql,
        duration_ql,
        rhythmic_type: builder.rhythmic_type,
        principal: pitch,
        extras: Vec::new(),
    });
    *source_order += 1;
    *cursor_ql += duration_ql;
}

/// Symbolic duration category for a quarter-length, used when the notated
/// `<type>` is absent
fn rhythmic_type_for_quarter_length(quarter_length: f64) -> String {
    const TABLE: [(f64, &str); 7] = [
        (4.0, "whole"),
        (2.0, "half"),
        (1.0, "quarter"),
        (0.5, "eighth"),
        (0.25, "16th"),
        (0.125, "32nd"),
        (0.0625, "64th"),
    ];

    for (base, name) in TABLE {
        if quarter_length >= base {
            return name.to_string();
        }
    }
    // Zero-length (grace) and sub-64th notations
    "64th".to_string()
}
