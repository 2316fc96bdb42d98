//! Domain types shared by the crawler, the reconciler and the store
//!
//! - `RegistryRecord`: one licensed piece of equipment as listed by the registry
//! - Status constants for the two lifecycle states the registry publishes

mod record;

pub use record::{RegistryRecord, STATUS_DECOMMISSIONED, STATUS_IN_OPERATION};
