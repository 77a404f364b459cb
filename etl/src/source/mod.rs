//! Source store abstractions.
//!
//! The [`Source`] trait covers everything the pipeline needs from the operational database:
//! selecting eligible shipments, deleting them once archived and running housekeeping.

mod base;
pub mod postgres;

pub use base::{RecordStream, Source};
