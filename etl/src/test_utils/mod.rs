//! Testing utilities for the archival pipeline.
//!
//! - [`memory_source`] provides [`memory_source::MemorySource`], an in-memory shipments table
//!   with transactional deletes and fault injection.
//! - [`record`] builds decoded shipment records.
//! - [`database`] spawns throwaway Postgres databases for tests running against a real server
//!   (feature `postgres-tests`).
//!
//! The in-memory warehouse lives in [`crate::destination::memory`].

#[cfg(feature = "postgres-tests")]
pub mod database;
pub mod memory_source;
pub mod record;
