//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the sync database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track sync runs and their final counters
CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    scraped INTEGER NOT NULL DEFAULT 0,
    inserted INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    unchanged INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    pages_ok INTEGER NOT NULL DEFAULT 0,
    pages_error INTEGER NOT NULL DEFAULT 0
);

-- One row per registry serial number; rows are never deleted
CREATE TABLE IF NOT EXISTS registry_records (
    serial_number TEXT PRIMARY KEY CHECK (length(serial_number) > 0),
    details_uuid TEXT,
    equipment_type TEXT NOT NULL,
    company_name TEXT,
    brand_name TEXT,
    slot_address TEXT NOT NULL,
    city TEXT,
    county TEXT,
    license_number TEXT NOT NULL,
    authorization_date TEXT,
    expiry_date TEXT,
    status TEXT NOT NULL,
    is_expired INTEGER NOT NULL DEFAULT 0,
    onjn_list_url TEXT NOT NULL,
    onjn_details_url TEXT,
    last_scraped_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_county ON registry_records(county);
CREATE INDEX IF NOT EXISTS idx_records_status ON registry_records(status);
CREATE INDEX IF NOT EXISTS idx_records_license ON registry_records(license_number);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
