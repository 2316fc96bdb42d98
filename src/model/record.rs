//! Registry record definition
//!
//! A record is keyed by its serial number and carries the URL it was last
//! observed at, so every stored row can be traced back to the registry.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Canonical status for equipment currently in use
pub const STATUS_IN_OPERATION: &str = "În exploatare";

/// Canonical status for equipment taken out of service
pub const STATUS_DECOMMISSIONED: &str = "Scos din funcțiune";

/// One row of the registry listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    /// Natural key, unique within the registry
    pub serial_number: String,

    /// Identifier from the detail link (`/e/{uuid}`)
    pub details_uuid: Option<String>,

    pub equipment_type: String,

    /// First token of the operator cell
    pub company_name: Option<String>,

    /// Second token of the operator cell
    pub brand_name: Option<String>,

    /// Address exactly as listed
    pub slot_address: String,
    pub city: Option<String>,
    pub county: Option<String>,

    pub license_number: String,

    pub authorization_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,

    pub status: String,

    /// True when `expiry_date` lies before the day the record was written
    pub is_expired: bool,

    /// Listing page the record was seen on
    pub onjn_list_url: String,

    /// Detail page for the record, when the listing links one
    pub onjn_details_url: Option<String>,

    pub last_scraped_at: DateTime<Utc>,
}

impl RegistryRecord {
    /// Derives the expiry flag for a given day
    ///
    /// A record without an expiry date never counts as expired.
    pub fn compute_is_expired(expiry_date: Option<NaiveDate>, today: NaiveDate) -> bool {
        expiry_date.map(|expiry| expiry < today).unwrap_or(false)
    }

    /// Recomputes `is_expired` against `now`
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>) {
        self.is_expired = Self::compute_is_expired(self.expiry_date, now.date_naive());
    }

    /// Marks the record as observed at `now`, keeping derived fields consistent
    pub fn observe(&mut self, now: DateTime<Utc>) {
        self.last_scraped_at = now;
        self.refresh_expiry(now);
    }
}
