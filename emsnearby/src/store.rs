//! Access to the hosted document collections.
//!
//! Store handles are passed explicitly into the pipeline pieces that
//! need them, so the selection logic stays testable against
//! [`MemoryStore`] without a hosted backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::geo::Coordinates;
use crate::model::{ArchiveRecord, Report, ReportStatus, SosAlert, SosStatus, UserRecord};

/// An error raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure.
    #[cfg(feature = "http")]
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("store answered {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },
    /// A document could not be decoded.
    #[error("decode document failed: {0}")]
    Decode(#[from] serde_json::Error),
    /// The addressed document does not exist.
    #[error("no such document: {0}")]
    Missing(String),
}

/// Read and write access to the `users` collection.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Fetch every user record along with its document id.
    async fn fetch_users(&self) -> Result<Vec<(String, UserRecord)>, StoreError>;

    /// Fetch a single user record, `None` if the user has never
    /// reported a position.
    async fn user(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Merge a position report into the user's record and stamp it
    /// with the current time. Last write wins.
    async fn upsert_user(
        &self,
        id: &str,
        location: Coordinates,
        fcm_token: &str,
        email: &str,
    ) -> Result<(), StoreError>;
}

/// Operator access to the incident collections.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Fetch an SOS alert by id.
    async fn sos_alert(&self, id: &str) -> Result<Option<SosAlert>, StoreError>;

    /// Set the status of an SOS alert.
    async fn set_sos_status(&self, id: &str, status: SosStatus) -> Result<(), StoreError>;

    /// Fetch an incident report by id.
    async fn report(&self, id: &str) -> Result<Option<Report>, StoreError>;

    /// Set the status of an incident report.
    async fn set_report_status(&self, id: &str, status: ReportStatus) -> Result<(), StoreError>;

    /// Append an entry to the analytics archive.
    async fn archive(&self, record: &ArchiveRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Collections {
    // user order is preserved so fetch_users is deterministic
    users: Vec<(String, UserRecord)>,
    sos_alerts: HashMap<String, SosAlert>,
    reports: HashMap<String, Report>,
    archive: Vec<ArchiveRecord>,
}

/// In-process store used in tests and for local development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user record.
    pub fn insert_user(&self, id: impl Into<String>, record: UserRecord) {
        let id = id.into();
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.users.iter_mut().find(|(existing, _)| *existing == id) {
            slot.1 = record;
        } else {
            inner.users.push((id, record));
        }
    }

    /// Seed an SOS alert.
    pub fn insert_sos(&self, alert: SosAlert) {
        self.inner
            .lock()
            .unwrap()
            .sos_alerts
            .insert(alert.id.clone(), alert);
    }

    /// Seed an incident report.
    pub fn insert_report(&self, report: Report) {
        self.inner
            .lock()
            .unwrap()
            .reports
            .insert(report.id.clone(), report);
    }

    /// Snapshot of the analytics archive.
    #[must_use]
    pub fn archived(&self) -> Vec<ArchiveRecord> {
        self.inner.lock().unwrap().archive.clone()
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn fetch_users(&self) -> Result<Vec<(String, UserRecord)>, StoreError> {
        Ok(self.inner.lock().unwrap().users.clone())
    }

    async fn user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, record)| record.clone()))
    }

    async fn upsert_user(
        &self,
        id: &str,
        location: Coordinates,
        fcm_token: &str,
        email: &str,
    ) -> Result<(), StoreError> {
        self.insert_user(
            id,
            UserRecord {
                location: Some(location),
                fcm_token: Some(fcm_token.to_owned()),
                email: Some(email.to_owned()),
                last_updated: Some(OffsetDateTime::now_utc()),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn sos_alert(&self, id: &str) -> Result<Option<SosAlert>, StoreError> {
        Ok(self.inner.lock().unwrap().sos_alerts.get(id).cloned())
    }

    async fn set_sos_status(&self, id: &str, status: SosStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let alert = inner
            .sos_alerts
            .get_mut(id)
            .ok_or_else(|| StoreError::Missing(id.to_owned()))?;
        alert.status = status;
        Ok(())
    }

    async fn report(&self, id: &str) -> Result<Option<Report>, StoreError> {
        Ok(self.inner.lock().unwrap().reports.get(id).cloned())
    }

    async fn set_report_status(&self, id: &str, status: ReportStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let report = inner
            .reports
            .get_mut(id)
            .ok_or_else(|| StoreError::Missing(id.to_owned()))?;
        report.status = status;
        Ok(())
    }

    async fn archive(&self, record: &ArchiveRecord) -> Result<(), StoreError> {
        self.inner.lock().unwrap().archive.push(record.clone());
        Ok(())
    }
}
