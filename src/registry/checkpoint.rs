//! Crawl checkpoint
//!
//! The checkpoint is the run's record set written out as JSON, together
//! with a flag saying whether the run reached its end. A restarted run reads
//! an unfinished checkpoint back and skips the pages it already covered; a
//! finished one only serves `--import`.

use crate::model::RegistryRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Checkpoint at {path} is not a valid record list: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Contents of a checkpoint file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// True once the run that wrote it stopped at the end of the registry
    /// or the page limit
    #[serde(default)]
    pub complete: bool,

    pub records: Vec<RegistryRecord>,
}

#[derive(Serialize)]
struct CheckpointRef<'a> {
    complete: bool,
    records: &'a [RegistryRecord],
}

/// Files written before the completion flag existed are bare record arrays
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCheckpoint {
    State(CheckpointState),
    Records(Vec<RegistryRecord>),
}

impl From<StoredCheckpoint> for CheckpointState {
    fn from(stored: StoredCheckpoint) -> Self {
        match stored {
            StoredCheckpoint::State(state) => state,
            StoredCheckpoint::Records(records) => Self {
                complete: false,
                records,
            },
        }
    }
}

/// First page to fetch when `records_so_far` records were already collected
pub fn resume_page(records_so_far: usize, records_per_page: u32) -> u32 {
    let per_page = records_per_page.max(1) as usize;
    (records_so_far / per_page) as u32 + 1
}

/// Records collected during a run, in first-seen order, unique by serial number
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<RegistryRecord>,
    seen: HashSet<String>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from checkpointed records, dropping later duplicates
    pub fn from_records(records: Vec<RegistryRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.insert(record);
        }
        set
    }

    /// Adds a record unless its serial number is already present
    ///
    /// Returns true when the record was new.
    pub fn insert(&mut self, record: RegistryRecord) -> bool {
        if self.seen.contains(&record.serial_number) {
            return false;
        }
        self.seen.insert(record.serial_number.clone());
        self.records.push(record);
        true
    }

    /// Merges a page of records and returns the ones not seen before
    pub fn merge(&mut self, records: Vec<RegistryRecord>) -> Vec<RegistryRecord> {
        records
            .into_iter()
            .filter(|record| self.insert(record.clone()))
            .collect()
    }

    pub fn contains(&self, serial_number: &str) -> bool {
        self.seen.contains(serial_number)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_slice(&self) -> &[RegistryRecord] {
        &self.records
    }
}

/// A checkpoint file on disk
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the checkpoint; `None` when no file exists
    pub fn load(&self) -> Result<Option<CheckpointState>, CheckpointError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let stored: StoredCheckpoint = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| CheckpointError::Json {
                path: self.path.clone(),
                source,
            })?;

        Ok(Some(stored.into()))
    }

    /// Saves the records of a run that is still in progress
    pub fn save(&self, records: &[RegistryRecord]) -> Result<(), CheckpointError> {
        self.write(records, false)
    }

    /// Saves the records of a run that reached its end
    pub fn save_complete(&self, records: &[RegistryRecord]) -> Result<(), CheckpointError> {
        self.write(records, true)
    }

    /// Replaces the checkpoint atomically
    ///
    /// The records go to `<path>.tmp` first, which is then renamed over the
    /// target, so a crash never leaves a truncated checkpoint behind.
    fn write(&self, records: &[RegistryRecord], complete: bool) -> Result<(), CheckpointError> {
        let tmp_path = self.tmp_path();
        let io_err = |source| CheckpointError::Io {
            path: tmp_path.clone(),
            source,
        };

        let file = File::create(&tmp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        let state = CheckpointRef { complete, records };
        serde_json::to_writer(&mut writer, &state).map_err(|source| CheckpointError::Json {
            path: tmp_path.clone(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
        writer.get_ref().sync_all().map_err(io_err)?;
        drop(writer);

        fs::rename(&tmp_path, &self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!(
            "Checkpoint saved: {} records to {} (complete: {})",
            records.len(),
            self.path.display(),
            complete
        );
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
