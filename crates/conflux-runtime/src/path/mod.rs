//! Command/result correlation.
//!
//! Re-exports the path table and its result-return policies.

pub mod group;
pub mod table;

pub use group::ResultReturnPolicy;
pub use table::{Path, PathKind, PathTable, PathTimeouts, Resolved};
