//! Conversions from Postgres wire values into pipeline types.

pub mod numeric;
pub mod properties;
pub mod row;
