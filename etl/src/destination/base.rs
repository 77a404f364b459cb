use std::future::Future;

use crate::error::EtlResult;
use crate::types::ShipmentPayload;

/// Analytical store receiving archived shipments.
///
/// Every call writes exactly one shipment as its own warehouse job and resolves only once the
/// job is confirmed complete. A returned error means the row was not written; the pipeline then
/// keeps the shipment in the source for a later run.
pub trait Warehouse {
    /// Returns the name of the warehouse.
    fn name() -> &'static str;

    /// Inserts one shipment, waiting for the insert to be durable.
    fn insert_shipment(
        &self,
        shipment: &ShipmentPayload,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
