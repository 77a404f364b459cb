use std::collections::BTreeSet;

use crate::error::EtlError;

/// Result of transferring one record to the warehouse.
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    /// The warehouse confirmed the insert job.
    Committed { uid: String },
    /// The record stays in the source. `uid` is absent when the record had no usable identifier.
    Failed { uid: Option<String>, error: EtlError },
}

impl TransferOutcome {
    pub fn uid(&self) -> Option<&str> {
        match self {
            TransferOutcome::Committed { uid } => Some(uid),
            TransferOutcome::Failed { uid, .. } => uid.as_deref(),
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, TransferOutcome::Committed { .. })
    }
}

/// A record that could not be transferred.
#[derive(Debug, Clone)]
pub struct FailedTransfer {
    pub uid: Option<String>,
    pub error: EtlError,
}

/// Identifiers whose warehouse write was confirmed, in transfer order.
///
/// This is the only input allowed to drive deletions from the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommittedSet {
    uids: Vec<String>,
}

impl CommittedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `uid`, ignoring duplicates. Returns whether it was newly added.
    pub fn insert(&mut self, uid: String) -> bool {
        if self.uids.contains(&uid) {
            return false;
        }

        self.uids.push(uid);
        true
    }

    pub fn uids(&self) -> &[String] {
        &self.uids
    }

    pub fn to_set(&self) -> BTreeSet<String> {
        self.uids.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CommittedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = CommittedSet::new();
        for uid in iter {
            set.insert(uid.into());
        }

        set
    }
}

/// Splits per-record outcomes into the committed set and the failures.
pub fn partition_outcomes(
    outcomes: impl IntoIterator<Item = TransferOutcome>,
) -> (CommittedSet, Vec<FailedTransfer>) {
    let mut committed = CommittedSet::new();
    let mut failed = Vec::new();

    for outcome in outcomes {
        match outcome {
            TransferOutcome::Committed { uid } => {
                committed.insert(uid);
            }
            TransferOutcome::Failed { uid, error } => failed.push(FailedTransfer { uid, error }),
        }
    }

    (committed, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::etl_error;

    #[test]
    fn partition_keeps_transfer_order_and_failures() {
        let outcomes = vec![
            TransferOutcome::Committed {
                uid: "a".to_string(),
            },
            TransferOutcome::Failed {
                uid: Some("b".to_string()),
                error: etl_error!(ErrorKind::WarehouseJobFailed, "Insert job failed"),
            },
            TransferOutcome::Committed {
                uid: "c".to_string(),
            },
        ];

        let (committed, failed) = partition_outcomes(outcomes);

        assert_eq!(committed.uids(), ["a", "c"]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].uid.as_deref(), Some("b"));
    }

    #[test]
    fn committed_set_ignores_duplicates() {
        let set: CommittedSet = ["x", "y", "x"].into_iter().collect();

        assert_eq!(set.len(), 2);
        assert_eq!(set.uids(), ["x", "y"]);
    }
}
