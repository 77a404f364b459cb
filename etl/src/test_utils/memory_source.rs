use futures::StreamExt;
use futures::stream;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::{RecordStream, Source};
use crate::types::{Record, TableName, Value};

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<Record>,
    batch_size: Option<usize>,
    /// Position in the selection at which decoding fails.
    fail_decode_at: Option<usize>,
    /// 1-based position of the delete statement failing inside a transaction.
    fail_delete_at: Option<usize>,
    /// Rows removed by someone else right before the delete transaction starts.
    vanishing_uids: HashSet<String>,
    /// Statement prefix whose maintenance execution fails.
    fail_maintenance: Option<String>,
    maintenance_statements: Vec<String>,
    delete_transactions: usize,
}

/// In-memory shipments table implementing [`Source`].
///
/// Selection returns the stored rows in insertion order, limited to the batch size if one is set.
/// Deletes are applied to a copy of the table that replaces it only once every delete succeeded,
/// which mirrors a committed transaction. Clones share the same table.
#[derive(Debug, Clone)]
pub struct MemorySource {
    table_name: TableName,
    uid_column: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new(rows: Vec<Record>) -> Self {
        Self {
            table_name: TableName::new("public", "shipments"),
            uid_column: "uid".to_string(),
            inner: Arc::new(Mutex::new(Inner {
                rows,
                ..Inner::default()
            })),
        }
    }

    pub fn with_uid_column(mut self, uid_column: impl Into<String>) -> Self {
        self.uid_column = uid_column.into();
        self
    }

    pub async fn set_batch_size(&self, batch_size: usize) {
        self.inner.lock().await.batch_size = Some(batch_size);
    }

    /// Makes the selection stream fail at `position`, after yielding the rows before it.
    pub async fn fail_decode_at(&self, position: usize) {
        self.inner.lock().await.fail_decode_at = Some(position);
    }

    /// Makes the `nth` delete (1-based) of every transaction fail.
    pub async fn fail_delete_at(&self, nth: usize) {
        self.inner.lock().await.fail_delete_at = Some(nth);
    }

    /// Removes the row of `uid` right before the next delete transaction, as if another process
    /// had deleted it after it was selected.
    pub async fn vanish_before_delete(&self, uid: impl Into<String>) {
        self.inner.lock().await.vanishing_uids.insert(uid.into());
    }

    /// Makes maintenance statements starting with `prefix` fail.
    pub async fn fail_maintenance(&self, prefix: impl Into<String>) {
        self.inner.lock().await.fail_maintenance = Some(prefix.into());
    }

    pub async fn insert(&self, record: Record) {
        self.inner.lock().await.rows.push(record);
    }

    /// Returns the identifiers still stored, in insertion order.
    pub async fn uids(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .rows
            .iter()
            .filter_map(|row| row_uid(row, &self.uid_column).map(str::to_string))
            .collect()
    }

    pub async fn row_count(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    /// Returns every maintenance statement attempted, in order.
    pub async fn maintenance_statements(&self) -> Vec<String> {
        self.inner.lock().await.maintenance_statements.clone()
    }

    /// Returns how many delete transactions were started.
    pub async fn delete_transactions(&self) -> usize {
        self.inner.lock().await.delete_transactions
    }
}

fn row_uid<'a>(row: &'a Record, uid_column: &str) -> Option<&'a str> {
    row.get(uid_column).and_then(Value::as_str)
}

impl Source for MemorySource {
    fn table_name(&self) -> &TableName {
        &self.table_name
    }

    fn uid_column(&self) -> &str {
        &self.uid_column
    }

    async fn select_records(&self) -> EtlResult<RecordStream<'_>> {
        let inner = self.inner.lock().await;

        let limit = inner.batch_size.unwrap_or(inner.rows.len());
        let mut items: Vec<EtlResult<Record>> =
            inner.rows.iter().take(limit).cloned().map(Ok).collect();

        if let Some(position) = inner.fail_decode_at
            && position < items.len()
        {
            items.truncate(position);
            items.push(Err(etl_error!(
                ErrorKind::RowDecodeFailed,
                "Failed to decode source row",
                format!("injected decode failure at row {position}")
            )));
        }

        Ok(stream::iter(items).boxed())
    }

    async fn delete_records(&self, uids: &[String]) -> EtlResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.delete_transactions += 1;

        let vanishing = std::mem::take(&mut inner.vanishing_uids);
        inner
            .rows
            .retain(|row| row_uid(row, &self.uid_column).is_none_or(|uid| !vanishing.contains(uid)));

        let mut rows = inner.rows.clone();
        let mut deleted = Vec::new();

        for (idx, uid) in uids.iter().enumerate() {
            if inner.fail_delete_at == Some(idx + 1) {
                // The copy is dropped, leaving the table untouched.
                bail!(
                    ErrorKind::SourceQueryFailed,
                    "Delete statement failed",
                    format!("injected failure deleting `{uid}`")
                );
            }

            let before = rows.len();
            rows.retain(|row| row_uid(row, &self.uid_column) != Some(uid.as_str()));
            if rows.len() < before {
                deleted.push(uid.clone());
            }
        }

        inner.rows = rows;

        Ok(deleted)
    }

    async fn execute_maintenance(&self, statement: &str) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.maintenance_statements.push(statement.to_string());

        if let Some(prefix) = &inner.fail_maintenance
            && statement.starts_with(prefix.as_str())
        {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Maintenance statement failed",
                format!("injected failure for `{statement}`")
            );
        }

        Ok(())
    }
}
