//! HTTP API integration tests
//!
//! Drives the full router with tower::oneshot against a temp storage root,
//! an in-memory database and a mock recognizer.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

use common::{
    insert_legacy_record, multipart_upload_body, setup_state, FailingRecognizer, MockRecognizer,
    MULTIPART_BOUNDARY, TWO_NOTE_XML,
};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn upload_request(profile: Uuid, title: &str, filename: &str, file: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/scores")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        )
        .body(Body::from(multipart_upload_body(
            profile, title, filename, file,
        )))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_root, _pool, state) = setup_state(Arc::new(FailingRecognizer)).await;
    let app = klavia_si::build_router(state);

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "klavia-si");
}

#[tokio::test]
async fn test_upload_runs_pipeline_and_returns_score_id() {
    let recognizer = Arc::new(MockRecognizer {
        xml: TWO_NOTE_XML.to_string(),
    });
    let (_root, pool, state) = setup_state(recognizer).await;
    let app = klavia_si::build_router(state);

    let profile = Uuid::new_v4();
    let response = app
        .oneshot(upload_request(
            profile,
            "Moonlight Sonata",
            "moonlight.pdf",
            b"%PDF-1.4 pretend scan",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let score_id = Uuid::parse_str(json["scoreId"].as_str().unwrap()).unwrap();

    let record = klavia_si::db::scores::get_score(&pool, score_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.profile_guid, profile);
    assert_eq!(record.title, "Moonlight Sonata");
    assert!(record.events_path.is_some());
}

#[tokio::test]
async fn test_upload_rejects_non_pdf() {
    let (_root, pool, state) = setup_state(Arc::new(FailingRecognizer)).await;
    let app = klavia_si::build_router(state);

    let response = app
        .oneshot(upload_request(
            Uuid::new_v4(),
            "Not a scan",
            "notes.txt",
            b"just some text, definitely not a pdf",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "BAD_REQUEST");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scores")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_upload_reports_recognition_failure() {
    let (_root, _pool, state) = setup_state(Arc::new(FailingRecognizer)).await;
    let app = klavia_si::build_router(state);

    let response = app
        .oneshot(upload_request(
            Uuid::new_v4(),
            "Unreadable",
            "blurry.pdf",
            b"%PDF-1.4 blurry scan",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "RECOGNITION_FAILED");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("page unreadable"));
}

#[tokio::test]
async fn test_events_endpoint_returns_ordered_sequence() {
    let recognizer = Arc::new(MockRecognizer {
        xml: TWO_NOTE_XML.to_string(),
    });
    let (_root, _pool, state) = setup_state(recognizer).await;
    let app = klavia_si::build_router(state);

    let profile = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(upload_request(
            profile,
            "Two Notes",
            "two.pdf",
            b"%PDF-1.4 scan",
        ))
        .await
        .unwrap();
    let score_id = body_json(response).await["scoreId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(
            Request::get(format!(
                "/api/scores/{}/events?profile_id={}",
                score_id, profile
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["referenceTempoBPM"], 120.0);

    let sequence = json["orderedSequence"].as_array().unwrap();
    assert_eq!(sequence.len(), 2);
    assert_eq!(sequence[0]["sequenceIndex"], 0);
    assert_eq!(sequence[0]["canonicalName"], "C4");
    assert_eq!(sequence[0]["midiNumber"], 60);
    assert_eq!(sequence[0]["durationQuarterLengths"], 1.0);
    assert_eq!(sequence[0]["referenceTempoBPM"], 120.0);
    assert_eq!(sequence[0]["isChord"], false);
    assert_eq!(sequence[1]["sequenceIndex"], 1);
    assert_eq!(sequence[1]["canonicalName"], "D4");
    assert_eq!(sequence[1]["midiNumber"], 62);
}

#[tokio::test]
async fn test_events_materialized_for_legacy_record() {
    let (root, pool, state) = setup_state(Arc::new(FailingRecognizer)).await;
    let app = klavia_si::build_router(state);

    let profile = Uuid::new_v4();
    let record = insert_legacy_record(&pool, root.path(), profile).await;

    let response = app
        .oneshot(
            Request::get(format!(
                "/api/scores/{}/events?profile_id={}",
                record.guid, profile
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["orderedSequence"].as_array().unwrap().len(), 2);

    // The regenerated side file is now attached to the record
    let refreshed = klavia_si::db::scores::get_score(&pool, record.guid)
        .await
        .unwrap()
        .unwrap();
    assert!(refreshed.events_path.is_some());
}

#[tokio::test]
async fn test_events_for_foreign_profile_is_404() {
    let (root, pool, state) = setup_state(Arc::new(FailingRecognizer)).await;
    let app = klavia_si::build_router(state);

    let record = insert_legacy_record(&pool, root.path(), Uuid::new_v4()).await;

    let response = app
        .oneshot(
            Request::get(format!(
                "/api/scores/{}/events?profile_id={}",
                record.guid,
                Uuid::new_v4()
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_notation_endpoint_serves_raw_musicxml() {
    let (root, pool, state) = setup_state(Arc::new(FailingRecognizer)).await;
    let app = klavia_si::build_router(state);

    let profile = Uuid::new_v4();
    let record = insert_legacy_record(&pool, root.path(), profile).await;

    let response = app
        .oneshot(
            Request::get(format!(
                "/api/scores/{}/notation?profile_id={}",
                record.guid, profile
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.recordare.musicxml+xml"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let markup = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(markup.contains("<score-partwise"));
    assert!(markup.contains("<step>C</step>"));
}

#[tokio::test]
async fn test_notation_corruption_is_server_error() {
    let (root, pool, state) = setup_state(Arc::new(FailingRecognizer)).await;
    let app = klavia_si::build_router(state);

    let profile = Uuid::new_v4();
    let record = insert_legacy_record(&pool, root.path(), profile).await;
    // Clobber the archive after the row was written
    std::fs::write(&record.archive_path, b"no longer a zip").unwrap();

    let response = app
        .oneshot(
            Request::get(format!(
                "/api/scores/{}/notation?profile_id={}",
                record.guid, profile
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "ARCHIVE_CORRUPT");
}

#[tokio::test]
async fn test_list_and_delete_scores() {
    let recognizer = Arc::new(MockRecognizer {
        xml: TWO_NOTE_XML.to_string(),
    });
    let (_root, pool, state) = setup_state(recognizer).await;
    let app = klavia_si::build_router(state);

    let profile = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(upload_request(
            profile,
            "To Delete",
            "delete_me.pdf",
            b"%PDF-1.4 scan",
        ))
        .await
        .unwrap();
    let score_id = body_json(response).await["scoreId"]
        .as_str()
        .unwrap()
        .to_string();

    // Listed for the owner
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/profiles/{}/scores", profile))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    let scores = json["scores"].as_array().unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0]["title"], "To Delete");

    // Not listed for anyone else
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/profiles/{}/scores", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert!(json["scores"].as_array().unwrap().is_empty());

    // Delete and verify the row is gone
    let response = app
        .oneshot(
            Request::delete(format!("/api/scores/{}?profile_id={}", score_id, profile))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scores")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_upload_missing_fields_is_bad_request() {
    let (_root, _pool, state) = setup_state(Arc::new(FailingRecognizer)).await;
    let app = klavia_si::build_router(state);

    // Body with only a title field
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"title\"\r\n\r\nNo file\r\n");
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/scores")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
