//! Shared helpers for klavia-si integration tests

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use klavia_si::services::recognizer::{RecognizeError, Recognizer};
use klavia_si::services::IngestOrchestrator;
use klavia_si::AppState;

/// Two quarter notes (C4, D4) at 120 BPM
pub const TWO_NOTE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="3.1">
  <part-list><score-part id="P1"><part-name>Piano</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions></attributes>
      <direction><sound tempo="120"/></direction>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>1</duration><type>quarter</type></note>
      <note><pitch><step>D</step><octave>4</octave></pitch><duration>1</duration><type>quarter</type></note>
    </measure>
  </part>
</score-partwise>"#;

/// Write a minimal .mxl fixture archive
pub fn write_mxl(path: &Path, xml: &str) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    zip.start_file("META-INF/container.xml", options).unwrap();
    zip.write_all(b"<?xml version=\"1.0\"?><container/>").unwrap();

    zip.start_file("score.xml", options).unwrap();
    zip.write_all(xml.as_bytes()).unwrap();

    zip.finish().unwrap();
}

/// Recognizer stand-in that writes a fixture archive into the output tree
pub struct MockRecognizer {
    pub xml: String,
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(
        &self,
        _source: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, RecognizeError> {
        std::fs::create_dir_all(output_dir)?;
        let archive = output_dir.join("score.mxl");
        write_mxl(&archive, &self.xml);
        Ok(archive)
    }
}

/// Recognizer stand-in that always fails
pub struct FailingRecognizer;

#[async_trait]
impl Recognizer for FailingRecognizer {
    async fn recognize(
        &self,
        _source: &Path,
        _output_dir: &Path,
    ) -> Result<PathBuf, RecognizeError> {
        Err(RecognizeError::RecognitionFailed(
            "engine exited with Some(1): page unreadable".to_string(),
        ))
    }
}

/// Build application state on a temp root and in-memory database
pub async fn setup_state(recognizer: Arc<dyn Recognizer>) -> (TempDir, SqlitePool, AppState) {
    let root = TempDir::new().unwrap();
    klavia_common::config::ensure_root_layout(root.path()).unwrap();

    let pool = SqlitePool::connect(":memory:").await.unwrap();
    klavia_si::db::init_tables(&pool).await.unwrap();

    let orchestrator = Arc::new(IngestOrchestrator::new(
        pool.clone(),
        recognizer,
        root.path().to_path_buf(),
    ));
    let state = AppState::new(pool.clone(), orchestrator);

    (root, pool, state)
}

/// Insert a legacy score row (archive on disk, no events side file)
pub async fn insert_legacy_record(
    pool: &SqlitePool,
    root: &Path,
    profile: Uuid,
) -> klavia_si::db::scores::ScoreRecord {
    let archive_dir = root.join("recognized").join("legacy");
    std::fs::create_dir_all(&archive_dir).unwrap();
    let archive_path = archive_dir.join("legacy.mxl");
    write_mxl(&archive_path, TWO_NOTE_XML);

    let record = klavia_si::db::scores::ScoreRecord {
        guid: Uuid::new_v4(),
        profile_guid: profile,
        title: "Legacy Score".to_string(),
        raw_path: root.join("uploads/legacy.pdf").display().to_string(),
        archive_path: archive_path.display().to_string(),
        events_path: None,
    };
    klavia_si::db::scores::insert_score(pool, &record)
        .await
        .unwrap();
    record
}

/// Boundary used by [`multipart_upload_body`]
pub const MULTIPART_BOUNDARY: &str = "klavia-test-boundary";

/// Hand-rolled multipart/form-data body for the upload endpoint
pub fn multipart_upload_body(profile: Uuid, title: &str, filename: &str, file: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();

    let text_field = |body: &mut Vec<u8>, name: &str, value: &str| {
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    };

    text_field(&mut body, "profile_id", &profile.to_string());
    text_field(&mut body, "title", title);

    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(file);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}
