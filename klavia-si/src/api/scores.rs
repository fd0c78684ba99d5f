//! Score pipeline API handlers
//!
//! POST /api/scores                        upload + full ingestion run
//! GET  /api/scores/{id}/events            extracted note-event sequence
//! GET  /api/scores/{id}/notation          raw MusicXML from the archive
//! DELETE /api/scores/{id}                 remove record + artifacts
//! GET  /api/profiles/{id}/scores          list a profile's scores

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::ExtractedScore,
    services::IngestRequest,
    AppState,
};

/// MusicXML media type for the raw notation boundary
const MUSICXML_CONTENT_TYPE: &str = "application/vnd.recordare.musicxml+xml";

/// Score pipeline routes
pub fn score_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scores", post(upload_score))
        .route("/api/scores/:score_id/events", get(get_score_events))
        .route("/api/scores/:score_id/notation", get(get_score_notation))
        .route("/api/scores/:score_id", delete(delete_score))
        .route("/api/profiles/:profile_id/scores", get(list_profile_scores))
}

/// Owner scoping for per-score routes
#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub profile_id: Uuid,
}

/// POST /api/scores response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadScoreResponse {
    pub score_id: Uuid,
}

/// GET /api/profiles/{id}/scores response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListScoresResponse {
    pub scores: Vec<crate::db::scores::ScoreSummary>,
}

/// POST /api/scores
///
/// Multipart fields: `profile_id`, `title`, `file`. Runs the whole
/// pipeline before responding; any stage failure comes back as one
/// consolidated error.
pub async fn upload_score(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadScoreResponse>> {
    let mut profile_id: Option<Uuid> = None;
    let mut title: Option<String> = None;
    let mut filename: Option<String> = None;
    let mut payload: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("profile_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Bad profile_id field: {}", e)))?;
                let parsed = Uuid::parse_str(text.trim())
                    .map_err(|e| ApiError::BadRequest(format!("Invalid profile_id: {}", e)))?;
                profile_id = Some(parsed);
            }
            Some("title") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Bad title field: {}", e)))?;
                title = Some(text);
            }
            Some("file") => {
                filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Bad file field: {}", e)))?;
                payload = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let profile_id =
        profile_id.ok_or_else(|| ApiError::BadRequest("Missing profile_id field".to_string()))?;
    let title = title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing title field".to_string()))?;
    let payload =
        payload.ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;
    let filename = filename.unwrap_or_else(|| "score.pdf".to_string());

    // The pipeline only accepts scanned sheets; sniff the magic bytes
    // rather than trusting the filename
    let is_pdf = infer::get(&payload)
        .map(|kind| kind.mime_type() == "application/pdf")
        .unwrap_or(false);
    if !is_pdf {
        return Err(ApiError::BadRequest(
            "Uploaded document is not a PDF".to_string(),
        ));
    }

    tracing::info!(
        profile = %profile_id,
        title = %title,
        filename = %filename,
        bytes = payload.len(),
        "Score upload received"
    );

    let score_id = state
        .orchestrator
        .ingest(IngestRequest {
            profile_guid: profile_id,
            title,
            original_filename: filename,
            payload,
        })
        .await?;

    Ok(Json(UploadScoreResponse { score_id }))
}

/// GET /api/scores/{id}/events
///
/// Serves the persisted extracted score; legacy records get it
/// materialized on first request.
pub async fn get_score_events(
    State(state): State<AppState>,
    Path(score_id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> ApiResult<Json<ExtractedScore>> {
    let extracted = state
        .orchestrator
        .events_for_score(score_id, owner.profile_id)
        .await?;
    Ok(Json(extracted))
}

/// GET /api/scores/{id}/notation
///
/// Raw markup bytes extracted live from the archive. Archive corruption
/// here is a server-side error, not a client data error.
pub async fn get_score_notation(
    State(state): State<AppState>,
    Path(score_id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> ApiResult<Response> {
    let bytes = state
        .orchestrator
        .notation_for_score(score_id, owner.profile_id)
        .await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, MUSICXML_CONTENT_TYPE)],
        bytes,
    )
        .into_response())
}

/// DELETE /api/scores/{id}
pub async fn delete_score(
    State(state): State<AppState>,
    Path(score_id): Path<Uuid>,
    Query(owner): Query<OwnerQuery>,
) -> ApiResult<StatusCode> {
    state
        .orchestrator
        .delete_score(score_id, owner.profile_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/profiles/{id}/scores
pub async fn list_profile_scores(
    State(state): State<AppState>,
    Path(profile_id): Path<Uuid>,
) -> ApiResult<Json<ListScoresResponse>> {
    let scores = state.orchestrator.list_scores(profile_id).await?;
    Ok(Json(ListScoresResponse { scores }))
}
