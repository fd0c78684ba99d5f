//! Ingestion run state machine
//!
//! Each uploaded document drives one run through the states:
//! UPLOADED → RECOGNIZING → RECOGNIZED → EXTRACTING → READY,
//! with FAILED reachable from any non-terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Ingestion run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IngestState {
    /// Raw document persisted to durable storage
    Uploaded,
    /// External recognition engine running
    Recognizing,
    /// Validated score archive located
    Recognized,
    /// Archive being flattened into the note-event sequence
    Extracting,
    /// Score record persisted, artifact usable
    Ready,
    /// Run failed at some stage; side files left in place for diagnostics
    Failed,
}

impl IngestState {
    /// Terminal states end the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestState::Ready | IngestState::Failed)
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: IngestState,
    pub new_state: IngestState,
    pub transitioned_at: DateTime<Utc>,
}

/// Ingestion run (in-memory state)
///
/// Tracks one upload through the pipeline for logging and diagnostics.
/// Only terminal outcomes touch persistent storage: a usable score row
/// exists iff the run reached READY.
#[derive(Debug, Clone)]
pub struct IngestSession {
    /// Unique run identifier
    pub run_id: Uuid,

    /// Owning profile
    pub profile_guid: Uuid,

    /// Score title supplied by the uploader
    pub title: String,

    /// Original filename of the uploaded document
    pub original_filename: String,

    /// Current run state
    pub state: IngestState,

    /// Raw document location, set once UPLOADED is reached
    pub raw_path: Option<PathBuf>,

    /// Validated archive location, set once RECOGNIZED is reached
    pub archive_path: Option<PathBuf>,

    /// Run start time
    pub started_at: DateTime<Utc>,

    /// Run end time (terminal states only)
    pub ended_at: Option<DateTime<Utc>>,
}

impl IngestSession {
    /// Create a new run in the UPLOADED state
    pub fn new(profile_guid: Uuid, title: String, original_filename: String) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            profile_guid,
            title,
            original_filename,
            state: IngestState::Uploaded,
            raw_path: None,
            archive_path: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new state
    pub fn transition_to(&mut self, new_state: IngestState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        tracing::debug!(
            run_id = %transition.run_id,
            old_state = ?transition.old_state,
            new_state = ?transition.new_state,
            "Ingest state transition"
        );

        transition
    }
}
