//! Housekeeping run against the source table after archived rows were deleted.

use tracing::{error, info};

use crate::error::EtlError;
use crate::source::Source;
use crate::types::TableName;

/// Statements executed by [`run_maintenance`], in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceStep {
    Vacuum,
    Reindex,
    Analyze,
    Checkpoint,
}

impl MaintenanceStep {
    pub const ALL: [MaintenanceStep; 4] = [
        MaintenanceStep::Vacuum,
        MaintenanceStep::Reindex,
        MaintenanceStep::Analyze,
        MaintenanceStep::Checkpoint,
    ];

    /// Returns the statement for this step on `table`.
    pub fn statement(&self, table: &TableName) -> String {
        let table = table.as_quoted_identifier();
        match self {
            MaintenanceStep::Vacuum => format!("vacuum {table}"),
            MaintenanceStep::Reindex => format!("reindex table {table}"),
            MaintenanceStep::Analyze => format!("analyze {table}"),
            MaintenanceStep::Checkpoint => "checkpoint".to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MaintenanceStep::Vacuum => "vacuum",
            MaintenanceStep::Reindex => "reindex",
            MaintenanceStep::Analyze => "analyze",
            MaintenanceStep::Checkpoint => "checkpoint",
        }
    }
}

/// Outcome of the maintenance sequence.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub completed: Vec<MaintenanceStep>,
    pub failed: Option<(MaintenanceStep, EtlError)>,
}

impl MaintenanceReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }
}

/// Runs the maintenance statements in order, stopping at the first failure.
///
/// Failures are logged and reported, never returned: the archived rows are already gone at this
/// point and the run is not undone by a failed housekeeping statement.
pub async fn run_maintenance<S>(source: &S) -> MaintenanceReport
where
    S: Source,
{
    let table = source.table_name();
    let mut report = MaintenanceReport::default();

    for step in MaintenanceStep::ALL {
        let statement = step.statement(table);
        info!(step = step.name(), %table, "running maintenance statement");

        if let Err(err) = source.execute_maintenance(&statement).await {
            error!(step = step.name(), %table, error = %err, "maintenance statement failed, skipping the rest");
            report.failed = Some((step, err));
            break;
        }

        report.completed.push(step);
    }

    report
}
