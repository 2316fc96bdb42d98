//! Change detection between a scraped record and its stored counterpart
//!
//! Most records re-crawled on a later run have not changed. Classifying them
//! as `Touch` keeps `updated_at` meaningful and the write path cheap.

use crate::model::RegistryRecord;
use std::fmt;

/// What the sink should do with an incoming record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Serial number never seen before
    Insert,

    /// At least one business field differs; replace every field
    Update,

    /// Nothing differs; advance `last_scraped_at` only
    Touch,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Touch => "touch",
        };
        f.write_str(name)
    }
}

/// Classifies `incoming` against the stored record with the same serial number
pub fn reconcile(incoming: &RegistryRecord, existing: Option<&RegistryRecord>) -> Decision {
    match existing {
        None => Decision::Insert,
        Some(existing) if changed_fields(incoming, existing).is_empty() => Decision::Touch,
        Some(_) => Decision::Update,
    }
}

/// Names of the business fields that differ between two observations
///
/// `serial_number` and `last_scraped_at` are not business fields. Dates are
/// compared as calendar values, so two absent dates are equal.
pub fn changed_fields(incoming: &RegistryRecord, existing: &RegistryRecord) -> Vec<&'static str> {
    let mut changed = Vec::new();

    macro_rules! compare {
        ($($field:ident),+ $(,)?) => {
            $(
                if incoming.$field != existing.$field {
                    changed.push(stringify!($field));
                }
            )+
        };
    }

    compare!(
        details_uuid,
        equipment_type,
        company_name,
        brand_name,
        license_number,
        slot_address,
        city,
        county,
        authorization_date,
        expiry_date,
        status,
        is_expired,
        onjn_list_url,
        onjn_details_url,
    );

    changed
}
