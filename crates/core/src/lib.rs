//! Shared domain types for the fleet monitoring pipeline.
//!
//! Nothing in this crate performs I/O. The storage, stream and pipeline
//! crates build on the identifiers, error kinds and alert payload defined
//! here.

pub mod alert;
pub mod device;
pub mod error;
pub mod types;
