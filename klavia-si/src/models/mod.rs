//! Data models for klavia-si

pub mod ingest_session;
pub mod note_event;

pub use ingest_session::{IngestSession, IngestState, StateTransition};
pub use note_event::{ExtractedScore, NoteEvent};
