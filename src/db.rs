//! Database connector — the Flush Worker's sole collaborator for talking
//! to the remote store. Modeled as a trait so the core can compile and be
//! tested without a live Postgres instance. The core must compile and run
//! on a developer machine without any of these drivers.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::ScanRecord;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not connected")]
    NotConnected,

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("primary key violation")]
    Integrity,

    #[error("database error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Everything the Flush Worker needs from a database. One implementor owns
/// exactly one connection at a time; it is never shared across tasks.
#[async_trait]
pub trait DbConnector: Send {
    /// Establishes the connection. Called only when not already connected.
    async fn connect(&mut self) -> Result<()>;

    /// Drops the connection so the next loop iteration reconnects.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Creates `table` if absent, else adds the `ScannerName` and
    /// `PreferredUser` columns when missing. Errors here are logged and
    /// swallowed by the caller — schema maintenance must not block ingest.
    async fn ensure_table_exists(&mut self, table: &str) -> Result<()>;

    /// Idle-connection probe (`SELECT 1`). A failure is treated exactly
    /// like a connect failure by the caller.
    async fn heartbeat(&mut self) -> Result<()>;

    /// Inserts every record in one transaction and commits. Returns
    /// `Err(DbError::Integrity)` if any row collided on `(DeviceID,
    /// EntryNo)` — the transaction is rolled back and the caller should
    /// retry row-by-row via `insert_row`. Any other error also rolls back
    /// and signals the caller to drop the connection.
    async fn insert_batch(&mut self, table: &str, records: &[ScanRecord]) -> Result<()>;

    /// Inserts a single record outside any batch transaction, used for the
    /// duplicate-absorbing row-by-row replay path. `Err(DbError::Integrity)`
    /// means the row already exists and should be silently skipped.
    async fn insert_row(&mut self, table: &str, record: &ScanRecord) -> Result<()>;
}

/// `sqlx`-backed Postgres implementation. The Python original spoke to SQL
/// Server via `pyodbc`; Postgres plus `sqlx` is the idiomatic Rust
/// substitute; see DESIGN.md for the driver-choice rationale.
pub mod postgres {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::{Postgres, Transaction};

    pub struct PgConnector {
        connection_string: String,
        pool: Option<sqlx::PgPool>,
    }

    impl PgConnector {
        pub fn new(connection_string: impl Into<String>) -> Self {
            Self {
                connection_string: connection_string.into(),
                pool: None,
            }
        }

        fn pool(&self) -> Result<&sqlx::PgPool> {
            self.pool.as_ref().ok_or(DbError::NotConnected)
        }

        fn classify(err: sqlx::Error) -> DbError {
            if let sqlx::Error::Database(ref db_err) = err {
                if db_err.code().as_deref() == Some("23505") {
                    return DbError::Integrity;
                }
            }
            DbError::Other(err.to_string())
        }

        async fn bind_insert<'a>(
            tx: &mut Transaction<'a, Postgres>,
            table: &str,
            record: &ScanRecord,
        ) -> std::result::Result<(), sqlx::Error> {
            sqlx::query(&format!(
                "INSERT INTO {table} \
                 (device_id, scanner_name, entry_no, barcode, scan_date, scan_time, \
                  user_id, preferred_user, stowage, flight_no, order_date, dacs_class, \
                  leg, gally, block_no, container_code, des, dacs_ac_type) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)"
            ))
            .bind(&record.device_id)
            .bind(&record.scanner_name)
            .bind(record.entry_no)
            .bind(&record.barcode)
            .bind(record.scan_date)
            .bind(&record.scan_time)
            .bind(&record.user_id)
            .bind(&record.preferred_user)
            .bind(&record.stowage)
            .bind(&record.flight_no)
            .bind(record.order_date)
            .bind(&record.dacs_class)
            .bind(&record.leg)
            .bind(&record.gally)
            .bind(&record.block_no)
            .bind(&record.container_code)
            .bind(&record.des)
            .bind(&record.dacs_ac_type)
            .execute(&mut **tx)
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl DbConnector for PgConnector {
        async fn connect(&mut self) -> Result<()> {
            let pool = PgPoolOptions::new()
                .max_connections(1)
                .connect(&self.connection_string)
                .await
                .map_err(|e| DbError::Connect(e.to_string()))?;
            self.pool = Some(pool);
            Ok(())
        }

        fn disconnect(&mut self) {
            self.pool = None;
        }

        fn is_connected(&self) -> bool {
            self.pool.is_some()
        }

        async fn ensure_table_exists(&mut self, table: &str) -> Result<()> {
            let pool = self.pool()?.clone();
            let create = format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL,
                    device_id TEXT NOT NULL,
                    scanner_name TEXT,
                    entry_no INTEGER NOT NULL,
                    barcode TEXT NOT NULL,
                    scan_date DATE NOT NULL,
                    scan_time TEXT NOT NULL,
                    user_id TEXT,
                    preferred_user TEXT,
                    stowage TEXT,
                    flight_no TEXT,
                    order_date DATE,
                    dacs_class TEXT,
                    leg TEXT,
                    gally TEXT,
                    block_no TEXT,
                    container_code TEXT,
                    des TEXT,
                    dacs_ac_type TEXT,
                    PRIMARY KEY (device_id, entry_no)
                )"
            );
            sqlx::query(&create).execute(&pool).await.map_err(Self::classify)?;

            for (column, ty) in [("scanner_name", "TEXT"), ("preferred_user", "TEXT")] {
                let alter = format!("ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {column} {ty}");
                sqlx::query(&alter).execute(&pool).await.map_err(Self::classify)?;
            }
            Ok(())
        }

        async fn heartbeat(&mut self) -> Result<()> {
            let pool = self.pool()?.clone();
            sqlx::query("SELECT 1")
                .fetch_one(&pool)
                .await
                .map(|_: sqlx::postgres::PgRow| ())
                .map_err(Self::classify)
        }

        async fn insert_batch(&mut self, table: &str, records: &[ScanRecord]) -> Result<()> {
            let pool = self.pool()?.clone();
            let mut tx = pool.begin().await.map_err(Self::classify)?;
            for record in records {
                if let Err(e) = Self::bind_insert(&mut tx, table, record).await {
                    let classified = Self::classify(e);
                    tx.rollback().await.ok();
                    return Err(classified);
                }
            }
            tx.commit().await.map_err(Self::classify)?;
            Ok(())
        }

        async fn insert_row(&mut self, table: &str, record: &ScanRecord) -> Result<()> {
            let pool = self.pool()?.clone();
            let mut tx = pool.begin().await.map_err(Self::classify)?;
            match Self::bind_insert(&mut tx, table, record).await {
                Ok(()) => {
                    tx.commit().await.map_err(Self::classify)?;
                    Ok(())
                }
                Err(e) => {
                    let classified = Self::classify(e);
                    tx.rollback().await.ok();
                    Err(classified)
                }
            }
        }
    }
}

/// In-memory mock used by the Flush Worker's scenario tests.
/// Records every call so tests can assert on call order and counts, and
/// can be configured to simulate outages and pre-existing rows.
#[cfg(any(test, feature = "test-support"))]
pub mod mock {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Default)]
    pub struct MockDbConnector {
        pub connected: bool,
        pub connect_failures_remaining: u32,
        pub heartbeat_should_fail: bool,
        pub rows: BTreeMap<(String, i32), ScanRecord>,
        pub connect_calls: u32,
        pub heartbeat_calls: u32,
        pub ensure_table_calls: u32,
    }

    impl MockDbConnector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_connect_failures(mut self, n: u32) -> Self {
            self.connect_failures_remaining = n;
            self
        }

        pub fn seed_row(mut self, device_id: &str, entry_no: i32, record: ScanRecord) -> Self {
            self.rows.insert((device_id.to_string(), entry_no), record);
            self
        }
    }

    #[async_trait]
    impl DbConnector for MockDbConnector {
        async fn connect(&mut self) -> Result<()> {
            self.connect_calls += 1;
            if self.connect_failures_remaining > 0 {
                self.connect_failures_remaining -= 1;
                return Err(DbError::Connect("simulated outage".into()));
            }
            self.connected = true;
            Ok(())
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn ensure_table_exists(&mut self, _table: &str) -> Result<()> {
            self.ensure_table_calls += 1;
            Ok(())
        }

        async fn heartbeat(&mut self) -> Result<()> {
            self.heartbeat_calls += 1;
            if self.heartbeat_should_fail {
                return Err(DbError::Other("simulated heartbeat failure".into()));
            }
            Ok(())
        }

        async fn insert_batch(&mut self, _table: &str, records: &[ScanRecord]) -> Result<()> {
            for record in records {
                let key = (record.device_id.clone(), record.entry_no);
                if self.rows.contains_key(&key) {
                    return Err(DbError::Integrity);
                }
            }
            for record in records {
                let key = (record.device_id.clone(), record.entry_no);
                self.rows.insert(key, record.clone());
            }
            Ok(())
        }

        async fn insert_row(&mut self, _table: &str, record: &ScanRecord) -> Result<()> {
            let key = (record.device_id.clone(), record.entry_no);
            if self.rows.contains_key(&key) {
                return Err(DbError::Integrity);
            }
            self.rows.insert(key, record.clone());
            Ok(())
        }
    }
}
