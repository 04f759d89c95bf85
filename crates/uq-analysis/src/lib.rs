//! Aggregation of a finished sweep: rebase every run's profiles onto a
//! common grid and reduce them to a mean document with standard-error
//! fields.

pub mod interp;
pub mod merge;

pub use interp::{interp_linear, mean_and_stderr, InterpError};
pub use merge::{merge, MergeError};
