//! Score record store
//!
//! The persistence collaborator for the ingestion pipeline: which scores
//! exist, who owns them, and where their artifacts live on disk. Every
//! per-score operation is keyed by (score guid, owning profile guid) so the
//! pipeline never acts on behalf of a non-owned artifact.

use klavia_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// One persisted score record
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub guid: Uuid,
    pub profile_guid: Uuid,
    pub title: String,
    /// Raw uploaded document location
    pub raw_path: String,
    /// Validated score archive location
    pub archive_path: String,
    /// Extracted note-event side file; None for legacy records that
    /// predate extraction
    pub events_path: Option<String>,
}

/// Listing entry for a profile's scores
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub id: Uuid,
    pub title: String,
}

fn parse_guid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))
}

fn row_to_record(
    row: (String, String, String, String, String, Option<String>),
) -> Result<ScoreRecord> {
    Ok(ScoreRecord {
        guid: parse_guid(&row.0)?,
        profile_guid: parse_guid(&row.1)?,
        title: row.2,
        raw_path: row.3,
        archive_path: row.4,
        events_path: row.5,
    })
}

/// Insert a new score record
pub async fn insert_score(db: &SqlitePool, record: &ScoreRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO scores (guid, profile_guid, title, raw_path, archive_path, events_path)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.guid.to_string())
    .bind(record.profile_guid.to_string())
    .bind(&record.title)
    .bind(&record.raw_path)
    .bind(&record.archive_path)
    .bind(&record.events_path)
    .execute(db)
    .await?;

    tracing::debug!(score = %record.guid, "Score record inserted");

    Ok(())
}

/// Fetch a score record by id
pub async fn get_score(db: &SqlitePool, guid: Uuid) -> Result<Option<ScoreRecord>> {
    let row: Option<(String, String, String, String, String, Option<String>)> = sqlx::query_as(
        "SELECT guid, profile_guid, title, raw_path, archive_path, events_path \
         FROM scores WHERE guid = ?",
    )
    .bind(guid.to_string())
    .fetch_optional(db)
    .await?;

    row.map(row_to_record).transpose()
}

/// Fetch a score record by id, requiring the given owner
///
/// A row owned by a different profile is reported the same way as a
/// missing row.
pub async fn get_owned_score(
    db: &SqlitePool,
    guid: Uuid,
    profile_guid: Uuid,
) -> Result<Option<ScoreRecord>> {
    let row: Option<(String, String, String, String, String, Option<String>)> = sqlx::query_as(
        "SELECT guid, profile_guid, title, raw_path, archive_path, events_path \
         FROM scores WHERE guid = ? AND profile_guid = ?",
    )
    .bind(guid.to_string())
    .bind(profile_guid.to_string())
    .fetch_optional(db)
    .await?;

    row.map(row_to_record).transpose()
}

/// Attach (or replace) the extracted-events side file path
///
/// Last-write-wins: concurrent re-extractions of the same record converge
/// on the same deterministic path, so a duplicate attach is harmless.
pub async fn attach_events_path(db: &SqlitePool, guid: Uuid, events_path: &str) -> Result<()> {
    sqlx::query(
        "UPDATE scores SET events_path = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(events_path)
    .bind(guid.to_string())
    .execute(db)
    .await?;

    tracing::debug!(score = %guid, events_path = %events_path, "Events path attached");

    Ok(())
}

/// List a profile's scores, newest first
pub async fn list_scores(db: &SqlitePool, profile_guid: Uuid) -> Result<Vec<ScoreSummary>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT guid, title FROM scores WHERE profile_guid = ? ORDER BY created_at DESC, guid",
    )
    .bind(profile_guid.to_string())
    .fetch_all(db)
    .await?;

    rows.into_iter()
        .map(|(guid, title)| {
            Ok(ScoreSummary {
                id: parse_guid(&guid)?,
                title,
            })
        })
        .collect()
}

/// Delete a score record
pub async fn delete_score(db: &SqlitePool, guid: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM scores WHERE guid = ?")
        .bind(guid.to_string())
        .execute(db)
        .await?;

    tracing::debug!(score = %guid, "Score record deleted");

    Ok(())
}
