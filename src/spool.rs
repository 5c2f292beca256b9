//! The durable spool: an append-only, line-delimited, fsync'd JSON file
//! plus a sibling byte-offset file. The Scanner task appends; the Flush
//! task reads from the stored offset and, on success, advances it.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::record::ScanRecord;

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("spool io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("spool serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SpoolError>;

/// Single-producer append handle. One instance lives inside the Scanner
/// task; concurrent writers are not supported.
pub struct SpoolWriter {
    path: PathBuf,
}

impl SpoolWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Appends one record: open-append, write, flush, fsync — all before
    /// returning, so the Assembler's caller can treat the append as
    /// durable the moment this returns `Ok`.
    pub fn append(&self, record: &ScanRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

/// One line read back out of the spool during a flush pass.
pub enum SpoolLine {
    /// Parsed successfully.
    Record(ScanRecord),
    /// Blank or undeserializable — skipped, but still advances the offset
    /// so a permanently poison line can never block the pipeline.
    Skipped,
}

/// Reads every complete line available from `offset` to current EOF,
/// returning the parsed batch and the new offset to checkpoint. Malformed
/// and blank lines are skipped (and logged by the caller) but still
/// advance `new_offset`.
pub fn read_from_offset(path: &Path, offset: u64) -> Result<(Vec<ScanRecord>, u64)> {
    if !path.exists() {
        return Ok((Vec::new(), offset));
    }

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(file);

    let mut batch = Vec::new();
    let mut new_offset = offset;
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        new_offset += n as u64;

        match parse_line(&line) {
            SpoolLine::Record(rec) => batch.push(rec),
            SpoolLine::Skipped => {}
        }
    }

    Ok((batch, new_offset))
}

fn parse_line(line: &str) -> SpoolLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return SpoolLine::Skipped;
    }
    match serde_json::from_str::<ScanRecord>(trimmed) {
        Ok(rec) => SpoolLine::Record(rec),
        Err(_) => SpoolLine::Skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ScanRecord;
    use chrono::NaiveDate;

    fn sample(entry_no: i32) -> ScanRecord {
        ScanRecord {
            device_id: "D1".into(),
            scanner_name: "scanner0".into(),
            entry_no,
            barcode: format!("abc{entry_no}"),
            scan_date: NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            scan_time: "12:00:00".into(),
            user_id: None,
            preferred_user: None,
            stowage: None,
            flight_no: None,
            order_date: None,
            dacs_class: None,
            leg: None,
            gally: None,
            block_no: None,
            container_code: None,
            des: None,
            dacs_ac_type: None,
        }
    }

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.jsonl");
        let writer = SpoolWriter::new(&path);
        writer.append(&sample(1)).unwrap();
        writer.append(&sample(2)).unwrap();

        let (batch, offset) = read_from_offset(&path, 0).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].entry_no, 1);
        assert_eq!(offset, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn reading_twice_from_advanced_offset_yields_only_new_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.jsonl");
        let writer = SpoolWriter::new(&path);
        writer.append(&sample(1)).unwrap();
        let (_, offset1) = read_from_offset(&path, 0).unwrap();

        writer.append(&sample(2)).unwrap();
        let (batch2, offset2) = read_from_offset(&path, offset1).unwrap();
        assert_eq!(batch2.len(), 1);
        assert_eq!(batch2[0].entry_no, 2);
        assert!(offset2 > offset1);
    }

    #[test]
    fn missing_spool_file_yields_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.jsonl");
        let (batch, offset) = read_from_offset(&path, 0).unwrap();
        assert!(batch.is_empty());
        assert_eq!(offset, 0);
    }

    #[test]
    fn poison_line_is_skipped_but_advances_offset_s6() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.jsonl");
        let writer = SpoolWriter::new(&path);
        writer.append(&sample(1)).unwrap();

        // hand-write a malformed middle line, then a valid third line
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"{not json\n").unwrap();
        }
        writer.append(&sample(3)).unwrap();

        let (batch, offset) = read_from_offset(&path, 0).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].entry_no, 1);
        assert_eq!(batch[1].entry_no, 3);
        assert_eq!(offset, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn blank_line_is_skipped_but_advances_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.jsonl");
        {
            let mut f = OpenOptions::new().create(true).append(true).open(&path).unwrap();
            f.write_all(b"\n").unwrap();
        }
        let writer = SpoolWriter::new(&path);
        writer.append(&sample(1)).unwrap();

        let (batch, offset) = read_from_offset(&path, 0).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(offset, std::fs::metadata(&path).unwrap().len());
    }
}
