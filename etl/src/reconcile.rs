//! Deletion of archived shipments from the source.
//!
//! Only identifiers in a [`CommittedSet`] are ever deleted. The deletes run in a single source
//! transaction, after which the deleted identifiers are compared with the attempted ones.

use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::Source;
use crate::types::CommittedSet;

/// Status of a finished reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationStatus {
    /// Every attempted identifier was deleted.
    Complete,
    /// Some attempted identifiers matched no source row.
    PartialSuccess,
}

/// Attempted and deleted identifiers of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub attempted: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

impl ReconciliationResult {
    /// Identifiers that were attempted but not deleted.
    pub fn missing(&self) -> BTreeSet<String> {
        self.attempted.difference(&self.deleted).cloned().collect()
    }

    pub fn status(&self) -> ReconciliationStatus {
        if self.attempted == self.deleted {
            ReconciliationStatus::Complete
        } else {
            ReconciliationStatus::PartialSuccess
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status() == ReconciliationStatus::Complete
    }
}

/// Deletes the committed identifiers from `source` and verifies the result.
///
/// An empty committed set returns an empty, complete result without touching the source. A
/// failed delete transaction is rolled back by the source and surfaces as
/// [`ErrorKind::ReconciliationFailed`]; no identifier is deleted in that case.
pub async fn reconcile<S>(source: &S, committed: CommittedSet) -> EtlResult<ReconciliationResult>
where
    S: Source,
{
    if committed.is_empty() {
        info!("no committed shipments, skipping deletion");
        return Ok(ReconciliationResult::default());
    }

    let attempted = committed.to_set();
    info!(
        table = %source.table_name(),
        attempted = attempted.len(),
        "deleting archived shipments from source"
    );

    let deleted = source
        .delete_records(committed.uids())
        .await
        .map_err(|err| {
            etl_error!(
                ErrorKind::ReconciliationFailed,
                "Delete transaction was rolled back",
                format!("{} committed shipments remain in the source", attempted.len()),
                source: err
            )
        })?;

    let result = ReconciliationResult {
        attempted,
        deleted: deleted.into_iter().collect(),
    };

    match result.status() {
        ReconciliationStatus::Complete => {
            info!(deleted = result.deleted.len(), "reconciliation complete");
        }
        ReconciliationStatus::PartialSuccess => {
            let missing = result.missing();
            warn!(
                attempted = result.attempted.len(),
                deleted = result.deleted.len(),
                ?missing,
                "reconciliation partial, some committed shipments were not found in the source"
            );
        }
    }

    Ok(result)
}
