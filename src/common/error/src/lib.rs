//! Error types and result aliases for Strata.
//!
//! Every fallible operation in the workspace returns [`StrataResult`]. The
//! variants of [`StrataError`] map onto a stable [`ErrorCategory`] that the
//! driver reports per task, so callers can branch on the kind of failure
//! without matching on backend details.

mod error;

pub use error::{EngineFault, ErrorCategory, GenericError, StrataError, StrataResult};
