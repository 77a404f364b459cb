//! One archival run: select, transfer, reconcile and maintain.
//!
//! A [`Pipeline`] drives a single bounded batch through its phases strictly in order. Records
//! are written to the warehouse one at a time in selection order, and only the identifiers whose
//! write was confirmed are handed to the reconciler for deletion. Re-running the pipeline is the
//! only retry mechanism: failed records simply stay in the source.

use futures::StreamExt;
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::conversions::properties::extract_shipment;
use crate::destination::Warehouse;
use crate::error::EtlResult;
use crate::maintenance::{MaintenanceReport, run_maintenance};
use crate::reconcile::{ReconciliationResult, ReconciliationStatus, reconcile};
use crate::source::Source;
use crate::types::{
    CommittedSet, FailedTransfer, Record, TransferOutcome, Value, partition_outcomes,
};

/// Behaviour toggles of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Runs the maintenance statements after a reconciliation that deleted rows.
    pub maintenance_enabled: bool,
    /// Selects and extracts records without writing, deleting or maintaining anything.
    pub dry_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            maintenance_enabled: true,
            dry_run: false,
        }
    }
}

/// Phases of a run, entered strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Idle,
    Querying,
    Transferring,
    Reconciling,
    Maintaining,
    Done,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Querying => "querying",
            PipelinePhase::Transferring => "transferring",
            PipelinePhase::Reconciling => "reconciling",
            PipelinePhase::Maintaining => "maintaining",
            PipelinePhase::Done => "done",
        };

        write!(f, "{name}")
    }
}

/// Classification of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every selected record was archived and deleted.
    Complete,
    /// Deletion matched the committed set, but some records failed to transfer and remain in
    /// the source.
    CompleteWithFailures,
    /// Some committed identifiers were not deleted from the source.
    PartialSuccess,
}

/// Summary of one run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Number of records returned by the selection.
    pub selected: usize,
    /// Per record transfer outcomes, in selection order.
    pub outcomes: Vec<TransferOutcome>,
    /// Identifiers that would have been transferred. Only filled in dry runs.
    pub planned: Vec<String>,
    /// Absent in dry runs.
    pub reconciliation: Option<ReconciliationResult>,
    /// Absent when maintenance did not run.
    pub maintenance: Option<MaintenanceReport>,
}

impl RunReport {
    pub fn committed(&self) -> CommittedSet {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_committed())
            .filter_map(|outcome| outcome.uid())
            .collect()
    }

    pub fn failed(&self) -> Vec<FailedTransfer> {
        let (_, failed) = partition_outcomes(self.outcomes.iter().cloned());
        failed
    }

    pub fn status(&self) -> RunStatus {
        if let Some(reconciliation) = &self.reconciliation
            && reconciliation.status() == ReconciliationStatus::PartialSuccess
        {
            return RunStatus::PartialSuccess;
        }

        if self.outcomes.iter().any(|outcome| !outcome.is_committed()) {
            return RunStatus::CompleteWithFailures;
        }

        RunStatus::Complete
    }
}

/// Archival pipeline over a [`Source`] and a [`Warehouse`].
#[derive(Debug)]
pub struct Pipeline<S, W> {
    config: PipelineConfig,
    source: S,
    warehouse: W,
    phase: PipelinePhase,
}

impl<S, W> Pipeline<S, W>
where
    S: Source,
    W: Warehouse,
{
    pub fn new(config: PipelineConfig, source: S, warehouse: W) -> Self {
        Self {
            config,
            source,
            warehouse,
            phase: PipelinePhase::Idle,
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    /// Runs one batch to completion.
    ///
    /// Errors are returned only for batch level failures: the selection query, a row that cannot
    /// be decoded, or a rolled back delete transaction. Failures of single records are reported in
    /// the returned [`RunReport`].
    pub async fn run(&mut self) -> EtlResult<RunReport> {
        info!(
            table = %self.source.table_name(),
            warehouse = W::name(),
            dry_run = self.config.dry_run,
            "starting archival run"
        );

        let result = self.run_phases().await;
        if let Err(err) = &result {
            error!(phase = %self.phase, error = %err, "archival run failed");
        }

        result
    }

    async fn run_phases(&mut self) -> EtlResult<RunReport> {
        let mut report = RunReport::default();

        self.enter(PipelinePhase::Querying);
        let records = self.select().await?;
        report.selected = records.len();
        info!(selected = report.selected, "selected shipments to archive");

        self.enter(PipelinePhase::Transferring);
        if self.config.dry_run {
            report.outcomes = self.plan(&records, &mut report.planned);
            self.enter(PipelinePhase::Done);
            log_report(&report);

            return Ok(report);
        }
        report.outcomes = self.transfer(&records).await;

        // The committed set is rebuilt from the outcomes so that nothing but a confirmed write can
        // lead to a delete.
        let committed = report.committed();

        self.enter(PipelinePhase::Reconciling);
        let reconciliation = reconcile(&self.source, committed).await?;
        let deleted_any = !reconciliation.deleted.is_empty();
        report.reconciliation = Some(reconciliation);

        self.enter(PipelinePhase::Maintaining);
        if !self.config.maintenance_enabled {
            info!("maintenance disabled, skipping");
        } else if !deleted_any {
            info!("nothing was deleted, skipping maintenance");
        } else {
            report.maintenance = Some(run_maintenance(&self.source).await);
        }

        self.enter(PipelinePhase::Done);
        log_report(&report);

        Ok(report)
    }

    fn enter(&mut self, phase: PipelinePhase) {
        debug!(from = %self.phase, to = %phase, "pipeline phase change");
        self.phase = phase;
    }

    /// Drains the selection, failing on the first record that cannot be decoded.
    async fn select(&self) -> EtlResult<Vec<Record>> {
        let mut stream = self.source.select_records().await?;

        let mut records = Vec::new();
        while let Some(record) = stream.next().await {
            records.push(record?);
        }

        Ok(records)
    }

    async fn transfer(&self, records: &[Record]) -> Vec<TransferOutcome> {
        let uid_column = self.source.uid_column();
        let mut outcomes = Vec::with_capacity(records.len());

        for record in records {
            let shipment = match extract_shipment(record, uid_column) {
                Ok(shipment) => shipment,
                Err(err) => {
                    let uid = record_uid(record, uid_column);
                    warn!(uid = ?uid, error = %err, "shipment has an invalid shape, leaving it in the source");
                    outcomes.push(TransferOutcome::Failed { uid, error: err });
                    continue;
                }
            };

            match self.warehouse.insert_shipment(&shipment).await {
                Ok(()) => {
                    info!(
                        uid = %shipment.uid,
                        org_uid = %shipment.org_uid,
                        has_geo_point = shipment.geo_point.is_some(),
                        "shipment archived"
                    );
                    outcomes.push(TransferOutcome::Committed { uid: shipment.uid });
                }
                Err(err) => {
                    error!(
                        uid = %shipment.uid,
                        org_uid = %shipment.org_uid,
                        error = %err,
                        "warehouse write failed, leaving shipment in the source"
                    );
                    outcomes.push(TransferOutcome::Failed {
                        uid: Some(shipment.uid),
                        error: err,
                    });
                }
            }
        }

        outcomes
    }

    fn plan(&self, records: &[Record], planned: &mut Vec<String>) -> Vec<TransferOutcome> {
        let uid_column = self.source.uid_column();
        let mut outcomes = Vec::new();

        for record in records {
            match extract_shipment(record, uid_column) {
                Ok(shipment) => {
                    info!(
                        uid = %shipment.uid,
                        org_uid = %shipment.org_uid,
                        has_geo_point = shipment.geo_point.is_some(),
                        "dry run, would archive shipment"
                    );
                    planned.push(shipment.uid);
                }
                Err(err) => {
                    let uid = record_uid(record, uid_column);
                    warn!(uid = ?uid, error = %err, "dry run, shipment has an invalid shape");
                    outcomes.push(TransferOutcome::Failed { uid, error: err });
                }
            }
        }

        outcomes
    }
}

/// Returns the identifier of `record` if it has a usable one.
fn record_uid(record: &Record, uid_column: &str) -> Option<String> {
    record
        .get(uid_column)
        .and_then(Value::as_str)
        .filter(|uid| !uid.is_empty())
        .map(str::to_string)
}

fn log_report(report: &RunReport) {
    let committed = report.committed().len();
    let failed = report
        .outcomes
        .iter()
        .filter(|outcome| !outcome.is_committed())
        .count();
    let (deleted, missing) = report
        .reconciliation
        .as_ref()
        .map(|r| (r.deleted.len(), r.missing().len()))
        .unwrap_or_default();
    let maintenance_ok = report.maintenance.as_ref().map(|m| m.is_success());

    info!(
        status = ?report.status(),
        selected = report.selected,
        committed,
        failed,
        planned = report.planned.len(),
        deleted,
        missing,
        ?maintenance_ok,
        "archival run finished"
    );
}
