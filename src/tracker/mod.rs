//! Online correlation of event streams into per-target state.
//!
//! Trackers own only derived state (counts, times); events themselves stay
//! with the collector. Updates are serialized per tracker, so each observes
//! a total order consistent with the ingester sequence.

pub mod connection;
pub mod pool;
pub mod process;

/// Entries shown per target list in correlation reports.
pub const MAX_CONNECTION_TARGETS: usize = 5;
