//! CSV archival of finished sessions.
//!
//! The JSONL journal holds live state; once sessions are completed they can
//! be rolled up into a flat CSV for long-term storage and spreadsheet use.
//! Dialogue transcripts and formative pools are not carried into the CSV,
//! only the scalar fields the progression fold and reporting need.

use crate::store::JsonlSessionStore;
use crate::types::{SessionContext, SessionStatus, SessionType, SimulationSession};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// A row in the CSV archive
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    id: String,
    learner_id: String,
    case_id: String,
    session_type: String,
    status: String,
    score: Option<f64>,
    formative_count_since_eval: u32,
    started_at: String,
    ended_at: Option<String>,
}

impl From<&SimulationSession> for CsvRow {
    fn from(session: &SimulationSession) -> Self {
        CsvRow {
            id: session.id.to_string(),
            learner_id: session.learner_id.clone(),
            case_id: session.case_id.clone(),
            session_type: session.context.session_type.to_string(),
            status: session.status.to_string(),
            score: session.score,
            formative_count_since_eval: session.context.formative_count_since_eval,
            started_at: session.started_at.to_rfc3339(),
            ended_at: session.ended_at.map(|t| t.to_rfc3339()),
        }
    }
}

impl TryFrom<CsvRow> for SimulationSession {
    type Error = crate::Error;

    fn try_from(row: CsvRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| Error::Other(format!("Invalid UUID: {}", e)))?;

        let session_type = SessionType::parse(&row.session_type)
            .ok_or_else(|| Error::Other(format!("Unknown session type: {}", row.session_type)))?;

        let status = SessionStatus::parse(&row.status)
            .ok_or_else(|| Error::Other(format!("Unknown status: {}", row.status)))?;

        let started_at = DateTime::parse_from_rfc3339(&row.started_at)
            .map_err(|e| Error::Other(format!("Invalid date: {}", e)))?
            .with_timezone(&Utc);

        let ended_at = row
            .ended_at
            .as_ref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(SimulationSession {
            id,
            learner_id: row.learner_id,
            case_id: row.case_id,
            status,
            score: row.score,
            context: SessionContext {
                session_type,
                formative_count_since_eval: row.formative_count_since_eval,
                dialogue: vec![],       // Not stored in CSV
                formative_pool: vec![], // Not stored in CSV
            },
            started_at,
            ended_at,
        })
    }
}

/// Roll up finished sessions from the journal into the CSV archive
///
/// This function:
/// 1. Reads all sessions from the journal (last record per id wins)
/// 2. Appends completed and abandoned sessions to the CSV file
/// 3. Syncs the CSV to disk
/// 4. Copies the pre-rollup journal to .processed
/// 5. Atomically rewrites the journal with only in-progress sessions
/// 6. Returns the number of sessions archived
///
/// # Safety
/// - CSV is fsynced before the journal is rewritten
/// - The pre-rollup journal is kept as .processed to allow manual recovery
/// - A crash between steps leaves duplicate rows at worst; reads
///   deduplicate by id with the journal taking precedence
pub fn rollup_finished_sessions(store: &JsonlSessionStore) -> Result<usize> {
    let mut by_id: HashMap<Uuid, SimulationSession> = HashMap::new();
    for session in store.read_journal()? {
        by_id.insert(session.id, session);
    }

    let (finished, open): (Vec<SimulationSession>, Vec<SimulationSession>) = by_id
        .into_values()
        .partition(|s| s.status != SessionStatus::InProgress);

    if finished.is_empty() {
        tracing::info!("No finished sessions in journal to roll up");
        return Ok(0);
    }

    let csv_path = store.archive_path();
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    // Determine if we need to write headers by checking file size after opening
    // This avoids an extra stat() syscall
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    // Archive in chronological order so the CSV reads like a log.
    let mut finished = finished;
    finished.sort_by(|a, b| {
        a.started_at
            .cmp(&b.started_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    for session in &finished {
        let row = CsvRow::from(session);
        writer.serialize(row)?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Wrote {} sessions to CSV archive", finished.len());

    // Park a copy of the old journal, then replace it with the open sessions.
    let journal_path = store.journal_path();
    let processed_path = journal_path.with_extension("jsonl.processed");
    std::fs::copy(journal_path, &processed_path)?;
    rewrite_journal(journal_path, &open)?;

    tracing::info!(
        "Rewrote journal with {} open sessions, parked old journal at {:?}",
        open.len(),
        processed_path
    );

    Ok(finished.len())
}

/// Replace the journal contents atomically via a temp file in the same
/// directory
fn rewrite_journal(journal_path: &Path, sessions: &[SimulationSession]) -> Result<()> {
    let parent = journal_path
        .parent()
        .ok_or_else(|| Error::Other("Journal path has no parent directory".to_string()))?;

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut file = temp.as_file();
        for session in sessions {
            let line = serde_json::to_string(session)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(journal_path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Load all sessions from the CSV archive
///
/// Rows that fail to parse are logged and skipped. Duplicate ids can occur
/// if a rollup was retried after a crash; the last row wins.
pub fn read_archive(path: &Path) -> Result<Vec<SimulationSession>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let mut sessions: Vec<SimulationSession> = Vec::new();
    let mut index_by_id: HashMap<Uuid, usize> = HashMap::new();

    for result in reader.deserialize::<CsvRow>() {
        match result {
            Ok(row) => match SimulationSession::try_from(row) {
                Ok(session) => {
                    if let Some(&i) = index_by_id.get(&session.id) {
                        sessions[i] = session;
                    } else {
                        index_by_id.insert(session.id, sessions.len());
                        sessions.push(session);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse CSV row: {}", e);
                    // Continue processing other rows
                }
            },
            Err(e) => {
                tracing::warn!("Failed to deserialize CSV row: {}", e);
            }
        }
    }

    Ok(sessions)
}

/// Clean up old processed journal files
///
/// This removes all .processed files in the given directory.
pub fn cleanup_processed_journals(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Some(extension) = path.extension() {
            if extension == "processed" {
                std::fs::remove_file(&path)?;
                tracing::debug!("Removed processed journal: {:?}", path);
                count += 1;
            }
        }
    }

    if count > 0 {
        tracing::info!("Cleaned up {} processed journal files", count);
    }

    Ok(count)
}
