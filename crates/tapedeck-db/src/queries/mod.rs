//! Database query modules.
//!
//! - content_units: units supplied by the import stage
//! - records: merged records keyed by checksum or group key

pub mod content_units;
pub mod records;
