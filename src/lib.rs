//! Tapedeck - metadata reconciliation and episode integrity verification
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod metadata;
pub mod reconcile;
