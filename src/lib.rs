//! Local mirror of the Decent Cloud ledger.
//!
//! This crate incrementally pulls append-only blocks from a remote ledger
//! node, flattens them into queryable records, persists them in a local
//! keyed store, and keeps the mirror fresh via polling. A read-side view
//! layer provides sorting, label filtering, and substring search over the
//! mirrored records.

/// Remote ledger client and block/entry types
pub mod ledger;
/// Durable local keyed store
pub mod store;
/// Chain walk, normalization, and polling lifecycle
pub mod sync;
/// Sorting, filtering, search, and display formatting
pub mod view;
