//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RecordStore trait.

use crate::model::RegistryRecord;
use crate::output::RunSummary;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordStore, StorageError, StorageResult};
use crate::storage::{RowMeta, RunRecord, RunStatus};
use crate::SyncError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

const RECORD_COLUMNS: &str = "serial_number, details_uuid, equipment_type, company_name, \
     brand_name, slot_address, city, county, license_number, authorization_date, expiry_date, \
     status, is_expired, onjn_list_url, onjn_details_url, last_scraped_at";

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, scraped, inserted, \
     updated, unchanged, errors, pages_ok, pages_error";

/// SQLite record store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`
    ///
    /// `busy_timeout` bounds how long a write waits on a locked database.
    pub fn new(path: &Path, busy_timeout: Duration) -> Result<Self, SyncError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(busy_timeout)?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RegistryRecord> {
    Ok(RegistryRecord {
        serial_number: row.get(0)?,
        details_uuid: row.get(1)?,
        equipment_type: row.get(2)?,
        company_name: row.get(3)?,
        brand_name: row.get(4)?,
        slot_address: row.get(5)?,
        city: row.get(6)?,
        county: row.get(7)?,
        license_number: row.get(8)?,
        authorization_date: row.get(9)?,
        expiry_date: row.get(10)?,
        status: row.get(11)?,
        is_expired: row.get(12)?,
        onjn_list_url: row.get(13)?,
        onjn_details_url: row.get(14)?,
        last_scraped_at: row.get(15)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let count = |idx: usize| -> rusqlite::Result<u64> { Ok(row.get::<_, i64>(idx)? as u64) };

    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Failed),
        summary: RunSummary {
            scraped: count(5)?,
            inserted: count(6)?,
            updated: count(7)?,
            unchanged: count(8)?,
            errors: count(9)?,
            pages_ok: count(10)?,
            pages_error: count(11)?,
        },
    })
}

fn map_constraint(err: rusqlite::Error, serial_number: &str) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation(format!("serial number '{}'", serial_number))
        }
        other => StorageError::Sqlite(other),
    }
}

impl RecordStore for SqliteStore {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO sync_runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![Utc::now(), config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM sync_runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &RunSummary,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE sync_runs SET status = ?1, finished_at = ?2, scraped = ?3, inserted = ?4,
             updated = ?5, unchanged = ?6, errors = ?7, pages_ok = ?8, pages_error = ?9
             WHERE id = ?10",
            params![
                status.to_db_string(),
                Utc::now(),
                summary.scraped as i64,
                summary.inserted as i64,
                summary.updated as i64,
                summary.unchanged as i64,
                summary.errors as i64,
                summary.pages_ok as i64,
                summary.pages_error as i64,
                run_id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Records =====

    fn get_by_serial(&self, serial_number: &str) -> StorageResult<Option<RegistryRecord>> {
        let sql = format!(
            "SELECT {} FROM registry_records WHERE serial_number = ?1",
            RECORD_COLUMNS
        );
        let record = self
            .conn
            .query_row(&sql, params![serial_number], record_from_row)
            .optional()?;
        Ok(record)
    }

    fn insert_record(&mut self, record: &RegistryRecord) -> StorageResult<()> {
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO registry_records (serial_number, details_uuid, equipment_type,
                 company_name, brand_name, slot_address, city, county, license_number,
                 authorization_date, expiry_date, status, is_expired, onjn_list_url,
                 onjn_details_url, last_scraped_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
                 ON CONFLICT(serial_number) DO UPDATE SET
                    details_uuid = excluded.details_uuid,
                    equipment_type = excluded.equipment_type,
                    company_name = excluded.company_name,
                    brand_name = excluded.brand_name,
                    slot_address = excluded.slot_address,
                    city = excluded.city,
                    county = excluded.county,
                    license_number = excluded.license_number,
                    authorization_date = excluded.authorization_date,
                    expiry_date = excluded.expiry_date,
                    status = excluded.status,
                    is_expired = excluded.is_expired,
                    onjn_list_url = excluded.onjn_list_url,
                    onjn_details_url = excluded.onjn_details_url,
                    last_scraped_at = excluded.last_scraped_at,
                    updated_at = excluded.updated_at",
                params![
                    record.serial_number,
                    record.details_uuid,
                    record.equipment_type,
                    record.company_name,
                    record.brand_name,
                    record.slot_address,
                    record.city,
                    record.county,
                    record.license_number,
                    record.authorization_date,
                    record.expiry_date,
                    record.status,
                    record.is_expired,
                    record.onjn_list_url,
                    record.onjn_details_url,
                    record.last_scraped_at,
                    now
                ],
            )
            .map_err(|e| map_constraint(e, &record.serial_number))?;
        Ok(())
    }

    fn update_record(&mut self, record: &RegistryRecord) -> StorageResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE registry_records SET details_uuid = ?2, equipment_type = ?3,
                 company_name = ?4, brand_name = ?5, slot_address = ?6, city = ?7, county = ?8,
                 license_number = ?9, authorization_date = ?10, expiry_date = ?11, status = ?12,
                 is_expired = ?13, onjn_list_url = ?14, onjn_details_url = ?15,
                 last_scraped_at = ?16, updated_at = ?17
                 WHERE serial_number = ?1",
                params![
                    record.serial_number,
                    record.details_uuid,
                    record.equipment_type,
                    record.company_name,
                    record.brand_name,
                    record.slot_address,
                    record.city,
                    record.county,
                    record.license_number,
                    record.authorization_date,
                    record.expiry_date,
                    record.status,
                    record.is_expired,
                    record.onjn_list_url,
                    record.onjn_details_url,
                    record.last_scraped_at,
                    Utc::now()
                ],
            )
            .map_err(|e| map_constraint(e, &record.serial_number))?;

        if changed == 0 {
            return Err(StorageError::RecordNotFound(record.serial_number.clone()));
        }
        Ok(())
    }

    fn touch_record(
        &mut self,
        serial_number: &str,
        scraped_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE registry_records SET last_scraped_at = ?1 WHERE serial_number = ?2",
            params![scraped_at, serial_number],
        )?;

        if changed == 0 {
            return Err(StorageError::RecordNotFound(serial_number.to_string()));
        }
        Ok(())
    }

    fn get_row_meta(&self, serial_number: &str) -> StorageResult<Option<RowMeta>> {
        let meta = self
            .conn
            .query_row(
                "SELECT created_at, updated_at, last_scraped_at FROM registry_records
                 WHERE serial_number = ?1",
                params![serial_number],
                |row| {
                    Ok(RowMeta {
                        created_at: row.get(0)?,
                        updated_at: row.get(1)?,
                        last_scraped_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    // ===== Statistics =====

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM registry_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_expired(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM registry_records WHERE is_expired = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_by_status(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) AS count FROM registry_records
             GROUP BY status ORDER BY count DESC, status ASC",
        )?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn top_counties(&self, limit: usize) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT county, COUNT(*) AS count FROM registry_records
             WHERE county IS NOT NULL
             GROUP BY county ORDER BY count DESC, county ASC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
