//! Telemetry for the shipment archival job.
//!
//! Sets up structured logging through [`tracing`] for the binary and for tests.

pub mod tracing;
