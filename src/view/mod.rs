//! Read-side view over the mirrored ledger
//!
//! Sorting, label filtering, substring search, and display formatting for
//! presentation code. Operates on store snapshots and never mutates them.

/// Query shaping: sort, filter, search, format
mod query;

pub use query::*;
