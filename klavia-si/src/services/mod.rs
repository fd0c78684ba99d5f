//! Service layer for klavia-si
//!
//! - `score_extractor`: archive → flattened note-event sequence
//! - `recognizer` / `audiveris_client`: OMR capability and its engine
//! - `ingest_orchestrator`: upload → recognize → extract → persist
//! - `note_naming`: pitch math and locale note names

pub mod audiveris_client;
pub mod ingest_orchestrator;
pub mod note_naming;
pub mod recognizer;
pub mod score_extractor;

pub use audiveris_client::AudiverisClient;
pub use ingest_orchestrator::{IngestError, IngestOrchestrator, IngestRequest};
pub use recognizer::{RecognizeError, Recognizer};
pub use score_extractor::{ExtractError, ScoreExtractor};
