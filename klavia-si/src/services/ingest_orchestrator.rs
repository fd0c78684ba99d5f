//! Ingestion orchestrator
//!
//! Drives one uploaded document through the pipeline:
//! store raw → recognize → extract → persist. Every stage failure is
//! converted to a typed error and reported upward as a single consolidated
//! outcome; already-written files stay on disk for diagnostics, and no
//! usable score row is recorded for a failed run.
//!
//! Also owns the legacy read path: a persisted record with no extracted
//! events yet gets them materialized on first request, guarded by a
//! per-score advisory lock so concurrent requests coalesce on one
//! extraction instead of racing.

use crate::db;
use crate::db::scores::ScoreRecord;
use crate::models::{ExtractedScore, IngestSession, IngestState};
use crate::services::recognizer::{RecognizeError, Recognizer};
use crate::services::score_extractor::{ExtractError, ScoreExtractor};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Ingestion pipeline errors
#[derive(Debug, Error)]
pub enum IngestError {
    /// Raw document could not be durably written; nothing downstream ran
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Recognition bridge failure
    #[error(transparent)]
    Recognition(#[from] RecognizeError),

    /// Score extraction failure
    #[error(transparent)]
    Extraction(#[from] ExtractError),

    /// Persistence collaborator failure
    #[error("Database error: {0}")]
    Database(#[from] klavia_common::Error),

    /// Referenced artifact missing or owned by another profile
    #[error("Score not found: {0}")]
    NotFound(String),
}

impl IngestError {
    /// Stable error code naming the failing stage
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Storage(_) => "STORAGE_FAILURE",
            IngestError::Recognition(_) => "RECOGNITION_FAILED",
            IngestError::Extraction(ExtractError::ArchiveCorrupt(_)) => "ARCHIVE_CORRUPT",
            IngestError::Extraction(ExtractError::NoPlayableContent(_)) => "NO_PLAYABLE_CONTENT",
            IngestError::Extraction(ExtractError::ExtractionFailed(_)) => "EXTRACTION_FAILED",
            IngestError::Database(_) => "DATABASE_ERROR",
            IngestError::NotFound(_) => "NOT_FOUND",
        }
    }
}

/// One upload handed to the orchestrator
#[derive(Debug)]
pub struct IngestRequest {
    pub profile_guid: Uuid,
    pub title: String,
    pub original_filename: String,
    pub payload: Vec<u8>,
}

/// Ingestion orchestrator service
pub struct IngestOrchestrator {
    db: SqlitePool,
    recognizer: Arc<dyn Recognizer>,
    root: PathBuf,
    /// Per-score advisory locks for the legacy re-extraction path
    extraction_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl IngestOrchestrator {
    /// Create new orchestrator
    ///
    /// `root` is the storage root holding `uploads/` and `recognized/`.
    pub fn new(db: SqlitePool, recognizer: Arc<dyn Recognizer>, root: PathBuf) -> Self {
        Self {
            db,
            recognizer,
            root,
            extraction_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run the full ingestion pipeline for one uploaded document
    ///
    /// Returns the new score record's identifier on success.
    pub async fn ingest(&self, request: IngestRequest) -> Result<Uuid, IngestError> {
        let mut session = IngestSession::new(
            request.profile_guid,
            request.title.clone(),
            request.original_filename.clone(),
        );

        tracing::info!(
            run_id = %session.run_id,
            profile = %request.profile_guid,
            title = %request.title,
            "Starting ingestion run"
        );

        match self.run_pipeline(&mut session, request).await {
            Ok(score_guid) => {
                session.transition_to(IngestState::Ready);
                tracing::info!(
                    run_id = %session.run_id,
                    score = %score_guid,
                    "Ingestion run complete"
                );
                Ok(score_guid)
            }
            Err(e) => {
                session.transition_to(IngestState::Failed);
                // Side files stay on disk for post-hoc inspection
                tracing::error!(
                    run_id = %session.run_id,
                    state = ?session.state,
                    raw = ?session.raw_path,
                    archive = ?session.archive_path,
                    error = %e,
                    "Ingestion run failed"
                );
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        session: &mut IngestSession,
        request: IngestRequest,
    ) -> Result<Uuid, IngestError> {
        // Persist the original before anything can go wrong downstream
        let raw_path = self
            .store_raw(&request.profile_guid, &request.original_filename, &request.payload)
            .await?;
        session.raw_path = Some(raw_path.clone());

        session.transition_to(IngestState::Recognizing);
        let output_dir = self.recognition_dir(&raw_path);
        let archive_path = self.recognizer.recognize(&raw_path, &output_dir).await?;
        session.archive_path = Some(archive_path.clone());
        session.transition_to(IngestState::Recognized);

        session.transition_to(IngestState::Extracting);
        let extracted = extract_blocking(&archive_path).await?;
        let events_path = events_sidecar_path(&archive_path);
        write_events_file(&events_path, &extracted).await?;

        let record = ScoreRecord {
            guid: Uuid::new_v4(),
            profile_guid: request.profile_guid,
            title: request.title,
            raw_path: raw_path.display().to_string(),
            archive_path: archive_path.display().to_string(),
            events_path: Some(events_path.display().to_string()),
        };
        db::scores::insert_score(&self.db, &record).await?;

        Ok(record.guid)
    }

    /// Serve a score's extracted events, materializing them on demand
    ///
    /// Legacy records carry no events side file; the first request
    /// regenerates it from the archive and attaches it to the row.
    /// Concurrent requests for the same record coalesce on the per-score
    /// lock: one extraction runs, late arrivals re-check and read the
    /// attached result.
    pub async fn events_for_score(
        &self,
        score_guid: Uuid,
        profile_guid: Uuid,
    ) -> Result<ExtractedScore, IngestError> {
        let record = self.owned_record(score_guid, profile_guid).await?;

        if let Some(score) = read_events_file(&record).await {
            return Ok(score);
        }

        let lock = self.lock_for(score_guid).await;
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: an in-flight extraction may
        // have materialized the side file while we waited
        let record = self.owned_record(score_guid, profile_guid).await?;
        if let Some(score) = read_events_file(&record).await {
            return Ok(score);
        }

        tracing::info!(score = %score_guid, "Materializing extracted events for legacy record");

        let archive_path = PathBuf::from(&record.archive_path);
        let extracted = extract_blocking(&archive_path).await?;
        let events_path = events_sidecar_path(&archive_path);
        write_events_file(&events_path, &extracted).await?;
        db::scores::attach_events_path(&self.db, score_guid, &events_path.display().to_string())
            .await?;

        Ok(extracted)
    }

    /// Raw markup bytes of a score's primary notation document
    pub async fn notation_for_score(
        &self,
        score_guid: Uuid,
        profile_guid: Uuid,
    ) -> Result<Vec<u8>, IngestError> {
        let record = self.owned_record(score_guid, profile_guid).await?;
        let archive_path = PathBuf::from(&record.archive_path);

        let bytes = tokio::task::spawn_blocking(move || {
            ScoreExtractor::new().read_primary_notation(&archive_path)
        })
        .await
        .map_err(|e| {
            IngestError::Extraction(ExtractError::ExtractionFailed(format!(
                "notation task failed: {}",
                e
            )))
        })??;

        Ok(bytes)
    }

    /// Delete a score record and its raw/events artifacts
    ///
    /// The recognizer output directory is retained for diagnostics.
    pub async fn delete_score(
        &self,
        score_guid: Uuid,
        profile_guid: Uuid,
    ) -> Result<(), IngestError> {
        let record = self.owned_record(score_guid, profile_guid).await?;

        for path in [Some(record.raw_path.clone()), record.events_path.clone()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path, "Could not remove artifact: {}", e);
                }
            }
        }

        db::scores::delete_score(&self.db, score_guid).await?;

        tracing::info!(score = %score_guid, "Score deleted");

        Ok(())
    }

    /// List a profile's scores
    pub async fn list_scores(
        &self,
        profile_guid: Uuid,
    ) -> Result<Vec<db::scores::ScoreSummary>, IngestError> {
        Ok(db::scores::list_scores(&self.db, profile_guid).await?)
    }

    async fn owned_record(
        &self,
        score_guid: Uuid,
        profile_guid: Uuid,
    ) -> Result<ScoreRecord, IngestError> {
        db::scores::get_owned_score(&self.db, score_guid, profile_guid)
            .await?
            .ok_or_else(|| IngestError::NotFound(score_guid.to_string()))
    }

    /// Store the raw document under a collision-resistant name
    async fn store_raw(
        &self,
        profile_guid: &Uuid,
        original_filename: &str,
        payload: &[u8],
    ) -> Result<PathBuf, IngestError> {
        let stored_name = format!(
            "p{}_{}_{}",
            profile_guid.simple(),
            Utc::now().format("%Y%m%d%H%M%S"),
            sanitize_filename(original_filename)
        );
        let path = self.root.join("uploads").join(stored_name);

        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| IngestError::Storage(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), bytes = payload.len(), "Raw document stored");

        Ok(path)
    }

    /// Destination directory for one document's recognizer output
    fn recognition_dir(&self, raw_path: &Path) -> PathBuf {
        let stem = raw_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.root.join("recognized").join(stem)
    }

    async fn lock_for(&self, score_guid: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.extraction_locks.lock().await;
        locks
            .entry(score_guid)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Deterministic side-file path next to the archive
///
/// `foo.mxl` → `foo.events.json`; regeneration always converges on the
/// same path, which is what makes the attach step last-write-wins safe.
pub fn events_sidecar_path(archive_path: &Path) -> PathBuf {
    archive_path.with_extension("events.json")
}

/// Keep stored names shell- and filesystem-safe
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "document.pdf".to_string()
    } else {
        cleaned
    }
}

async fn extract_blocking(archive_path: &Path) -> Result<ExtractedScore, IngestError> {
    let path = archive_path.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || ScoreExtractor::new().extract(&path))
        .await
        .map_err(|e| {
            IngestError::Extraction(ExtractError::ExtractionFailed(format!(
                "extraction task failed: {}",
                e
            )))
        })??;
    Ok(extracted)
}

async fn write_events_file(
    events_path: &Path,
    extracted: &ExtractedScore,
) -> Result<(), IngestError> {
    let json = extracted
        .to_json()
        .map_err(|e| IngestError::Storage(format!("events serialization failed: {}", e)))?;

    tokio::fs::write(events_path, json)
        .await
        .map_err(|e| IngestError::Storage(format!("{}: {}", events_path.display(), e)))
}

/// Read and parse an attached events side file
///
/// A missing or unparseable side file is treated as not-yet-materialized
/// so the caller falls through to regeneration.
async fn read_events_file(record: &ScoreRecord) -> Option<ExtractedScore> {
    let path = record.events_path.as_ref()?;
    let json = tokio::fs::read_to_string(path).await.ok()?;
    match ExtractedScore::from_json(&json) {
        Ok(score) => Some(score),
        Err(e) => {
            tracing::warn!(path = %path, "Unparseable events side file, regenerating: {}", e);
            None
        }
    }
}
