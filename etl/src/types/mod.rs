//! Data types flowing through the archival pipeline.
//!
//! Rows are decoded into [`Record`]s, narrowed into [`ShipmentPayload`]s for the warehouse and
//! finally summarized as [`TransferOutcome`]s whose committed identifiers drive deletion.

mod outcome;
mod record;
mod shipment;
mod table;
mod value;

pub use outcome::*;
pub use record::*;
pub use shipment::*;
pub use table::*;
pub use value::*;

pub use crate::conversions::numeric::PgNumeric;
