//! Tapedeck-Common: shared identities, content kinds, and errors.
//!
//! This crate provides the vocabulary shared by the reconciliation engine and
//! the record store:
//!
//! - **Identities**: the content [`Checksum`] and [`EpisodeNumber`] pairs
//! - **Content kinds**: [`ContentUnit`], [`ContentKind`], [`EntityKind`] and
//!   the [`GroupKey`] that lookup groups are keyed by
//! - **Error Handling**: common error type and result alias
//!
//! # Examples
//!
//! ```
//! use tapedeck_common::{Checksum, ContentUnit, EntityKind};
//!
//! let unit = ContentUnit::episode(
//!     Checksum::parse("9f86d081884c7d65").unwrap(),
//!     "Fargo",
//!     1,
//!     7,
//! );
//! assert_eq!(unit.entity_kind(), EntityKind::Tv);
//! assert_eq!(unit.group_key().to_string(), "tv:Fargo:S01");
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
