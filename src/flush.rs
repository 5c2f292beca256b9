//! Flush Worker — the long-running loop that owns the database connection,
//! drains the spool, and advances the checkpoint.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audio::AudioPort;
use crate::db::{DbConnector, DbError};
use crate::spool;
use crate::state::OffsetFile;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

pub struct FlushWorker {
    db: Box<dyn DbConnector>,
    audio: Arc<dyn AudioPort>,
    table: String,
    spool_path: PathBuf,
    offset_file: OffsetFile,
    heartbeat_interval: Duration,
    offset: u64,
    schema_ready: bool,
    network_lost_signaled: bool,
    last_db_touch: Option<Instant>,
}

impl FlushWorker {
    pub fn new(
        db: Box<dyn DbConnector>,
        audio: Arc<dyn AudioPort>,
        table: impl Into<String>,
        spool_path: impl Into<PathBuf>,
        offset_file: OffsetFile,
        heartbeat_interval: Duration,
    ) -> crate::errors::Result<Self> {
        let offset = offset_file.load()?;
        Ok(Self {
            db,
            audio,
            table: table.into(),
            spool_path: spool_path.into(),
            offset_file,
            heartbeat_interval,
            offset,
            schema_ready: false,
            network_lost_signaled: false,
            last_db_touch: None,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Runs the loop until `token` is cancelled, sleeping `flush_interval`
    /// between iterations (bounded so shutdown observes cancellation
    /// promptly).
    pub async fn run(&mut self, token: CancellationToken, flush_interval: Duration) {
        loop {
            self.tick().await;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(flush_interval) => {}
            }
        }
    }

    /// One iteration of the loop body: connect, ensure schema, read the
    /// spool, insert or heartbeat, advance the offset. Split out from
    /// `run` so tests can drive it without real sleeps.
    pub async fn tick(&mut self) {
        if !self.db.is_connected() {
            if let Err(e) = self.db.connect().await {
                warn!(error = %e, "database connect failed");
                self.signal_network_lost();
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                return;
            }
            self.schema_ready = false;
        }

        if !self.schema_ready {
            if let Err(e) = self.db.ensure_table_exists(&self.table).await {
                warn!(error = %e, table = %self.table, "schema maintenance failed, continuing anyway");
            }
            self.schema_ready = true;
        }

        let (batch, new_offset) = match spool::read_from_offset(&self.spool_path, self.offset) {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "failed to read spool");
                return;
            }
        };

        if batch.is_empty() {
            self.maybe_heartbeat().await;
            self.advance_offset(new_offset);
            return;
        }

        match self.db.insert_batch(&self.table, &batch).await {
            Ok(()) => {
                self.last_db_touch = Some(Instant::now());
                self.advance_offset(new_offset);
                self.network_lost_signaled = false;
            }
            Err(DbError::Integrity) => {
                info!(count = batch.len(), "batch had PK collisions, replaying row by row");
                self.replay_row_by_row(&batch).await;
                self.last_db_touch = Some(Instant::now());
                self.advance_offset(new_offset);
            }
            Err(e) => {
                error!(error = %e, "batch insert failed, dropping connection");
                self.db.disconnect();
                self.schema_ready = false;
                self.signal_network_lost();
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }
    }

    async fn replay_row_by_row(&mut self, batch: &[crate::record::ScanRecord]) {
        for record in batch {
            match self.db.insert_row(&self.table, record).await {
                Ok(()) => {}
                Err(DbError::Integrity) => {
                    info!(
                        device_id = %record.device_id,
                        entry_no = record.entry_no,
                        "skipping duplicate row"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "row replay failed for a non-PK reason, skipping row");
                }
            }
        }
    }

    async fn maybe_heartbeat(&mut self) {
        let due = match self.last_db_touch {
            None => true,
            Some(last) => last.elapsed() >= self.heartbeat_interval,
        };
        if !due {
            return;
        }
        match self.db.heartbeat().await {
            Ok(()) => self.last_db_touch = Some(Instant::now()),
            Err(e) => {
                warn!(error = %e, "heartbeat failed, dropping connection");
                self.db.disconnect();
                self.schema_ready = false;
                self.signal_network_lost();
            }
        }
    }

    fn advance_offset(&mut self, new_offset: u64) {
        if new_offset == self.offset {
            return;
        }
        self.offset = new_offset;
        if let Err(e) = self.offset_file.save(new_offset) {
            error!(error = %e, "failed to persist spool offset");
        }
    }

    fn signal_network_lost(&mut self) {
        if !self.network_lost_signaled {
            self.audio.enqueue("network_lost");
            self.network_lost_signaled = true;
        }
    }
}
