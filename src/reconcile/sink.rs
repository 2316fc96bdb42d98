//! Applies reconciliation decisions to the record store
//!
//! A failing record is logged and counted; the batch always runs to the end.

use crate::model::RegistryRecord;
use crate::reconcile::decision::{changed_fields, reconcile, Decision};
use crate::storage::{RecordStore, StorageError};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors for a single record write
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Record has an empty serial number (seen at {list_url})")]
    EmptySerial { list_url: String },

    #[error("Store rejected {serial_number}: {source}")]
    Store {
        serial_number: String,
        source: StorageError,
    },
}

/// Write counters for one batch or one whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkCounters {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub errors: u64,
}

impl SinkCounters {
    fn count(&mut self, decision: Decision) {
        match decision {
            Decision::Insert => self.inserted += 1,
            Decision::Update => self.updated += 1,
            Decision::Touch => self.unchanged += 1,
        }
    }
}

/// The only writer of the record store during a run
pub struct Sink<'a> {
    store: &'a mut dyn RecordStore,
}

impl<'a> Sink<'a> {
    pub fn new(store: &'a mut dyn RecordStore) -> Self {
        Self { store }
    }

    /// Reconciles and writes one record
    ///
    /// `last_scraped_at` and `is_expired` are refreshed from `now` before
    /// comparing, so the stored flag is always consistent with the day of
    /// the write.
    pub fn apply(
        &mut self,
        record: &RegistryRecord,
        now: DateTime<Utc>,
    ) -> Result<Decision, SinkError> {
        if record.serial_number.trim().is_empty() {
            return Err(SinkError::EmptySerial {
                list_url: record.onjn_list_url.clone(),
            });
        }

        let mut incoming = record.clone();
        incoming.observe(now);

        let store_err = |source| SinkError::Store {
            serial_number: incoming.serial_number.clone(),
            source,
        };

        let existing = self
            .store
            .get_by_serial(&incoming.serial_number)
            .map_err(store_err)?;
        let decision = reconcile(&incoming, existing.as_ref());

        match decision {
            Decision::Insert => self.store.insert_record(&incoming),
            Decision::Update => {
                if let Some(existing) = &existing {
                    tracing::debug!(
                        "{} changed: {}",
                        incoming.serial_number,
                        changed_fields(&incoming, existing).join(", ")
                    );
                }
                self.store.update_record(&incoming)
            }
            Decision::Touch => self
                .store
                .touch_record(&incoming.serial_number, incoming.last_scraped_at),
        }
        .map_err(store_err)?;

        Ok(decision)
    }

    /// Applies a batch, counting every outcome
    pub fn apply_batch(&mut self, records: &[RegistryRecord]) -> SinkCounters {
        let now = Utc::now();
        let mut counters = SinkCounters::default();

        for record in records {
            match self.apply(record, now) {
                Ok(decision) => counters.count(decision),
                Err(e) => {
                    tracing::warn!("Failed to write record: {}", e);
                    counters.errors += 1;
                }
            }
        }

        counters
    }

    /// Logs the store's row count after a run
    pub fn verify(&self) -> Option<u64> {
        match self.store.count_records() {
            Ok(count) => {
                tracing::info!("Store now holds {} registry records", count);
                Some(count)
            }
            Err(e) => {
                tracing::warn!("Row count verification failed: {}", e);
                None
            }
        }
    }
}
