use futures::stream::BoxStream;
use std::future::Future;

use crate::error::EtlResult;
use crate::types::{Record, TableName};

/// Lazily decoded records of one selection, in source order.
pub type RecordStream<'a> = BoxStream<'a, EtlResult<Record>>;

/// Operational store that shipments are archived from.
///
/// A [`Source`] is used by a single pipeline run at a time: the same connection serves the
/// selection query, the delete transaction and the maintenance statements.
pub trait Source {
    /// Returns the table shipments are selected from.
    fn table_name(&self) -> &TableName;

    /// Returns the column identifying a shipment.
    fn uid_column(&self) -> &str;

    /// Selects the shipments eligible for archival.
    ///
    /// The returned stream is finite and can only be consumed once. Decoding failures surface as
    /// stream items; no partial record is ever yielded.
    fn select_records(&self) -> impl Future<Output = EtlResult<RecordStream<'_>>> + Send;

    /// Deletes `uids` inside one transaction and returns those which matched a row.
    ///
    /// Either every delete commits or, on the first execution error, the transaction is rolled
    /// back and the error returned. Identifiers that match no row are not an error; they are
    /// simply absent from the result.
    fn delete_records(&self, uids: &[String])
    -> impl Future<Output = EtlResult<Vec<String>>> + Send;

    /// Runs one administrative statement outside of any transaction.
    fn execute_maintenance(&self, statement: &str) -> impl Future<Output = EtlResult<()>> + Send;
}
