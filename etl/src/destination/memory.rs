use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::destination::Warehouse;
use crate::error::{ErrorKind, EtlResult};
use crate::types::ShipmentPayload;

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<ShipmentPayload>,
    failing_uids: HashSet<String>,
}

/// In-memory warehouse holding inserted shipments.
///
/// Clones share the same storage, so a test can keep a handle while the pipeline owns another.
/// Inserts for identifiers registered with [`MemoryWarehouse::fail_uid`] return an error, which
/// simulates failed warehouse jobs.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert of `uid` fail.
    pub async fn fail_uid(&self, uid: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.failing_uids.insert(uid.into());
    }

    /// Returns a copy of all inserted shipments, in insertion order.
    pub async fn rows(&self) -> Vec<ShipmentPayload> {
        let inner = self.inner.lock().await;
        inner.rows.clone()
    }

    /// Returns the identifiers of all inserted shipments, in insertion order.
    pub async fn uids(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.rows.iter().map(|row| row.uid.clone()).collect()
    }
}

impl Warehouse for MemoryWarehouse {
    fn name() -> &'static str {
        "memory"
    }

    async fn insert_shipment(&self, shipment: &ShipmentPayload) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.failing_uids.contains(&shipment.uid) {
            bail!(
                ErrorKind::WarehouseJobFailed,
                "Insert job failed",
                format!("injected failure for shipment `{}`", shipment.uid)
            );
        }

        info!(uid = %shipment.uid, "inserting shipment into memory warehouse");
        inner.rows.push(shipment.clone());

        Ok(())
    }
}
