//! Tapedeck-DB: record store schema, migrations, and query operations
//!
//! This crate provides the persistence layer for tapedeck using SQLite
//! with rusqlite and r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `queries` - Content unit and merged record operations
//!
//! # Example
//!
//! ```no_run
//! use tapedeck_common::{Checksum, ContentUnit};
//! use tapedeck_db::pool::{init_pool, get_conn};
//! use tapedeck_db::queries::content_units;
//!
//! let pool = init_pool("/var/lib/tapedeck/tapedeck.db").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let unit = ContentUnit::episode(Checksum::parse("ab12").unwrap(), "Fargo", 1, 1);
//! content_units::insert_unit(&conn, &unit).unwrap();
//! ```

pub mod migrations;
pub mod pool;
pub mod queries;
