//! Durable small-state files: the EntryNo high-water mark and the spool
//! read offset. Both use the same atomic write pattern: write to a sibling
//! temp file, fsync, rename over the target — so a crash mid-write can
//! never leave a half-written file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    {
        let mut tmp = std::fs::File::create(&tmp_path)?;
        use std::io::Write;
        tmp.write_all(contents)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct EntryNoDoc {
    last_entry_no: i32,
}

/// Tracks the highest `EntryNo` the Scanner task has assigned for one
/// device, persisted so a restart resumes numbering instead of colliding
/// with rows already spooled or flushed.
pub struct EntryNoState {
    path: PathBuf,
    last: i32,
}

impl EntryNoState {
    /// Loads the persisted value, or falls back to `starting_entry_no - 1`
    /// (so the first `next()` call yields `starting_entry_no`) if the file
    /// doesn't exist yet.
    pub fn load(path: impl Into<PathBuf>, starting_entry_no: i32) -> Result<Self> {
        let path = path.into();
        let last = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<EntryNoDoc>(&text)?.last_entry_no,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => starting_entry_no - 1,
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, last })
    }

    /// Returns the `EntryNo` the next record should use, without persisting
    /// anything. The caller assigns this number to a record, writes that
    /// record to the spool, and only then calls `commit` so the on-disk
    /// high-water mark never outruns what's actually been spooled.
    pub fn peek_next(&self) -> i32 {
        self.last + 1
    }

    /// Persists `entry_no` as the new high-water mark. Call only after the
    /// spool line using `entry_no` has been durably appended.
    pub fn commit(&mut self, entry_no: i32) -> Result<()> {
        self.last = entry_no;
        let doc = EntryNoDoc { last_entry_no: self.last };
        write_atomic(&self.path, serde_json::to_string(&doc)?.as_bytes())
    }
}

/// Tracks the byte offset into the spool file the Flush task has durably
/// committed through. On-disk format is a bare ASCII decimal integer, no
/// newline required — not JSON, unlike the entry-number state file.
pub struct OffsetFile {
    path: PathBuf,
}

impl OffsetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<u64> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.trim().parse().unwrap_or(0)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, offset: u64) -> Result<()> {
        write_atomic(&self.path, offset.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_no_state_starts_at_configured_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry_no.json");
        let mut state = EntryNoState::load(&path, 100).unwrap();
        assert_eq!(state.peek_next(), 100);
        state.commit(100).unwrap();
        assert_eq!(state.peek_next(), 101);
        state.commit(101).unwrap();
        assert_eq!(state.peek_next(), 102);
    }

    #[test]
    fn entry_no_state_resumes_after_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry_no.json");
        let mut state = EntryNoState::load(&path, 1).unwrap();
        state.commit(state.peek_next()).unwrap();
        state.commit(state.peek_next()).unwrap();

        let reloaded = EntryNoState::load(&path, 1).unwrap();
        assert_eq!(reloaded.peek_next(), 3);
    }

    #[test]
    fn peek_next_does_not_persist_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry_no.json");
        let state = EntryNoState::load(&path, 5).unwrap();
        assert_eq!(state.peek_next(), 5);
        // Peeking alone must not write the state file.
        assert!(!path.exists());
    }

    #[test]
    fn offset_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.offset");
        let offsets = OffsetFile::new(&path);
        assert_eq!(offsets.load().unwrap(), 0);
        offsets.save(42).unwrap();
        assert_eq!(offsets.load().unwrap(), 42);
    }

    #[test]
    fn offset_file_is_bare_ascii_decimal_not_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.offset");
        OffsetFile::new(&path).save(1234).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1234");
    }
}
