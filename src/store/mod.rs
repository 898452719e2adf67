//! Execution state persistence.
//!
//! Stores the last execution record in a JSON file so a restart or re-run
//! never double-buys. The commit is a compare-and-set keyed by period: a
//! submitted or confirmed record for the same period can never be
//! overwritten, only superseded reads back to the caller.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::types::ExecutionRecord;

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "drip_state.json";

/// Outcome of a compare-and-set commit.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// The record was written.
    Stored,
    /// A submitted/confirmed record for the same period already exists;
    /// the write was refused and the existing record is returned.
    Superseded(ExecutionRecord),
}

/// Durable record store with compare-and-set commit semantics.
///
/// `commit` must refuse to overwrite a record for the same period whose
/// status blocks re-execution. That single rule is what the engine's
/// at-most-once guarantee rests on.
pub trait ExecutionStore: Send + Sync {
    fn load(&self) -> Result<Option<ExecutionRecord>>;
    fn commit(&self, record: &ExecutionRecord) -> Result<CommitOutcome>;
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

/// File-backed store: one JSON document holding the latest record.
///
/// Writes go through a unique temp file and an atomic rename, and the
/// read-check-write sequence is serialized behind a process-local mutex.
/// Cross-process racers are caught by re-reading the file inside the
/// critical section before deciding.
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn read_file(path: &Path) -> Result<Option<ExecutionRecord>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state from {}", path.display()))?;
        let record: ExecutionRecord = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse state from {}", path.display()))?;
        Ok(Some(record))
    }

    fn write_file(path: &Path, record: &ExecutionRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)
            .context("Failed to serialise execution record")?;

        // Unique temp name so two processes can't clobber each other's
        // half-written file; the rename is atomic on POSIX.
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        std::fs::write(&tmp, &json)
            .with_context(|| format!("Failed to write state to {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move state into {}", path.display()))?;

        debug!(path = %path.display(), record = %record, "State saved");
        Ok(())
    }
}

impl ExecutionStore for JsonFileStore {
    fn load(&self) -> Result<Option<ExecutionRecord>> {
        let _lock = self
            .guard
            .lock()
            .map_err(|_| anyhow::anyhow!("state store mutex poisoned"))?;
        Self::read_file(&self.path)
    }

    fn commit(&self, record: &ExecutionRecord) -> Result<CommitOutcome> {
        let _lock = self
            .guard
            .lock()
            .map_err(|_| anyhow::anyhow!("state store mutex poisoned"))?;

        // Re-read inside the critical section: another writer may have
        // confirmed this period since our caller last loaded.
        if let Some(existing) = Self::read_file(&self.path)? {
            if existing.period_key == record.period_key && existing.status.blocks_reexecution() {
                info!(
                    period = %existing.period_key,
                    status = %existing.status,
                    "Commit refused: period already executed"
                );
                return Ok(CommitOutcome::Superseded(existing));
            }
        }

        Self::write_file(&self.path, record)?;
        Ok(CommitOutcome::Stored)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Volatile store with the same CAS semantics. Used by tests and useful
/// for dry runs where persistence is deliberately off.
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<ExecutionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(record: ExecutionRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl ExecutionStore for MemoryStore {
    fn load(&self) -> Result<Option<ExecutionRecord>> {
        let slot = self
            .record
            .lock()
            .map_err(|_| anyhow::anyhow!("state store mutex poisoned"))?;
        Ok(slot.clone())
    }

    fn commit(&self, record: &ExecutionRecord) -> Result<CommitOutcome> {
        let mut slot = self
            .record
            .lock()
            .map_err(|_| anyhow::anyhow!("state store mutex poisoned"))?;
        if let Some(existing) = slot.as_ref() {
            if existing.period_key == record.period_key && existing.status.blocks_reexecution() {
                return Ok(CommitOutcome::Superseded(existing.clone()));
            }
        }
        *slot = Some(record.clone());
        Ok(CommitOutcome::Stored)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
