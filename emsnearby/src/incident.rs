//! Operator actions on SOS alerts and incident reports.

use thiserror::Error;
use tracing::info;

use crate::model::{ArchiveRecord, ReportStatus, SosStatus};
use crate::store::{IncidentStore, StoreError};

/// An error raised by an operator action.
#[derive(Debug, Error)]
pub enum IncidentError {
    /// The store refused or failed the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The requested status change would move a report backwards.
    #[error("report cannot move from {from} to {to}")]
    Transition {
        /// Status the report is in.
        from: ReportStatus,
        /// Status that was requested.
        to: ReportStatus,
    },
}

/// Operator console actions, bound to an incident store.
#[derive(Debug)]
pub struct IncidentDesk<S> {
    store: S,
}

impl<S: IncidentStore> IncidentDesk<S> {
    /// A desk over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mark an SOS alert resolved and copy it to the analytics
    /// archive.
    ///
    /// # Errors
    ///
    /// Fails if the alert does not exist or the store rejects one of
    /// the writes.
    pub async fn resolve_sos(&self, id: &str) -> Result<(), IncidentError> {
        let mut alert = self
            .store
            .sos_alert(id)
            .await?
            .ok_or_else(|| StoreError::Missing(id.to_owned()))?;

        self.store.set_sos_status(id, SosStatus::Resolved).await?;
        alert.status = SosStatus::Resolved;
        self.store
            .archive(&ArchiveRecord::sos(&alert).map_err(StoreError::Decode)?)
            .await?;

        info!(%id, "sos alert resolved");
        Ok(())
    }

    /// Move a report to `status`.
    ///
    /// Transitions only move forward; a report that reaches
    /// [`ReportStatus::Resolved`] is copied to the analytics archive.
    ///
    /// # Errors
    ///
    /// Fails if the report does not exist, the transition moves
    /// backwards, or the store rejects one of the writes.
    pub async fn advance_report(&self, id: &str, status: ReportStatus) -> Result<(), IncidentError> {
        let mut report = self
            .store
            .report(id)
            .await?
            .ok_or_else(|| StoreError::Missing(id.to_owned()))?;

        if !report.status.can_advance_to(status) {
            return Err(IncidentError::Transition {
                from: report.status,
                to: status,
            });
        }

        self.store.set_report_status(id, status).await?;
        if status == ReportStatus::Resolved {
            report.status = status;
            self.store
                .archive(&ArchiveRecord::report(&report).map_err(StoreError::Decode)?)
                .await?;
        }

        info!(%id, %status, "report status updated");
        Ok(())
    }
}
