//! In-memory authoritative store and its components.

/// Book records keyed by id.
pub mod books;
/// Helper index aliases.
pub mod indices;
/// Append-only transaction log.
pub mod ledger;
/// Check-out / check-in state machine.
pub mod lifecycle;
/// Availability aggregates.
pub mod report;
/// Authoritative library store and op journaling.
pub mod store;
