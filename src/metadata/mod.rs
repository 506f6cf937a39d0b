//! Metadata providers and the field merge.
//!
//! This module defines the [`MetadataProvider`] trait implemented by every
//! metadata source, the per-call policy wrapped around it, and the
//! field-granular merge that turns provider records into one authoritative
//! record.
//!
//! # Module layout
//!
//! - [`provider`] -- Trait definition and shared data types.
//! - [`client`] -- Timeouts, retries and backoff around a provider.
//! - [`registry`] -- Provider registry.
//! - [`providers`] -- Concrete providers (scrape, probe, TMDB, OMDb, TheTVDB, TVmaze).
//! - [`fields`] -- Field catalog and per-field priority policy.
//! - [`merge`] -- Merge and upgrade of records.

pub mod client;
pub mod fields;
pub mod merge;
pub mod provider;
pub mod providers;
pub mod registry;

pub use client::{CallPolicy, Lookup, ProviderClient};
pub use fields::{FieldPolicy, FieldScope, GeneralPriority, IdentifierPriority};
pub use merge::{MergeResolver, MergedField, MergedRecord};
pub use provider::{
    Candidate, LookupKey, MetadataProvider, ProviderError, ProviderId, ProviderRecord,
    RemoteListing,
};
pub use registry::ProviderRegistry;
