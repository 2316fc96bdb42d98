//! Reconciliation of freshly scraped records against the store
//!
//! - `decision`: pure change detection (insert, update or touch)
//! - `sink`: applies decisions to a `RecordStore` and keeps run counters

mod decision;
mod sink;

pub use decision::{changed_fields, reconcile, Decision};
pub use sink::{Sink, SinkCounters, SinkError};
