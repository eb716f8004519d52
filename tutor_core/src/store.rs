//! Session persistence.
//!
//! Live sessions are appended to a JSONL journal, one record per line.
//! Updates append a fresh record for the same session id; readers keep the
//! last record seen, so the journal never needs in-place edits. Completed
//! sessions are periodically rolled up into a CSV archive (see `archive`),
//! and reads merge both files with the journal taking precedence.

use crate::types::SimulationSession;
use crate::{archive, Result};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Abstraction over session storage
///
/// The orchestrator only talks to this trait, so tests can substitute an
/// alternate store without touching the filesystem layout.
pub trait SessionStore {
    /// Persist a newly started session
    fn create(&self, session: &SimulationSession) -> Result<()>;

    /// Fetch a session by id, or None if it was never stored
    fn get(&self, id: Uuid) -> Result<Option<SimulationSession>>;

    /// Persist a new version of an existing session
    fn update(&self, session: &SimulationSession) -> Result<()>;

    /// All sessions, one entry per id, ordered by start time
    fn all(&self) -> Result<Vec<SimulationSession>>;
}

/// JSONL journal plus CSV archive, both under one data directory
pub struct JsonlSessionStore {
    journal_path: PathBuf,
    archive_path: PathBuf,
}

impl JsonlSessionStore {
    /// Create a store rooted at the given data directory
    pub fn new(data_dir: &Path) -> Self {
        Self {
            journal_path: data_dir.join("sessions.jsonl"),
            archive_path: data_dir.join("sessions.csv"),
        }
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Append one session record to the journal under an exclusive lock
    fn append_record(&self, session: &SimulationSession) -> Result<()> {
        if let Some(parent) = self.journal_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)?;

        file.lock_exclusive()?;

        let mut writer = BufWriter::new(&file);
        let line = serde_json::to_string(session)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        Ok(())
    }

    /// Read every parseable record from the journal, in file order
    ///
    /// Malformed lines (partial writes, manual edits) are logged and
    /// skipped so one bad record cannot take the whole store down.
    pub fn read_journal(&self) -> Result<Vec<SimulationSession>> {
        if !self.journal_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.journal_path)?;
        file.lock_shared()?;

        let reader = BufReader::new(&file);
        let mut sessions = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SimulationSession>(&line) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!("Skipping malformed journal line {}: {}", idx + 1, e);
                }
            }
        }

        file.unlock()?;
        Ok(sessions)
    }
}

impl SessionStore for JsonlSessionStore {
    fn create(&self, session: &SimulationSession) -> Result<()> {
        self.append_record(session)?;
        tracing::debug!("Created session {} in journal", session.id);
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<SimulationSession>> {
        Ok(self.all()?.into_iter().find(|s| s.id == id))
    }

    fn update(&self, session: &SimulationSession) -> Result<()> {
        self.append_record(session)?;
        tracing::debug!("Updated session {} in journal", session.id);
        Ok(())
    }

    fn all(&self) -> Result<Vec<SimulationSession>> {
        let mut by_id: HashMap<Uuid, SimulationSession> = HashMap::new();

        for session in archive::read_archive(&self.archive_path)? {
            by_id.insert(session.id, session);
        }
        // Journal records are newer than anything archived under the same id.
        for session in self.read_journal()? {
            by_id.insert(session.id, session);
        }

        let mut sessions: Vec<SimulationSession> = by_id.into_values().collect();
        sessions.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(sessions)
    }
}
