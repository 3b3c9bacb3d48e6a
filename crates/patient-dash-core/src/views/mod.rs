//! Derived views over the record cache.
//!
//! Everything here is a pure function of a cache snapshot and view
//! parameters: no side effects, no internal caching. Callers that need
//! memoization can key it on [`crate::records::Snapshot::version`].

mod listing;
mod stats;
mod summary;

pub use listing::*;
pub use stats::*;
pub use summary::*;
