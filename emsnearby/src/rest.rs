//! REST client for the hosted document collections.
//!
//! Each collection is exposed at `{base}/{collection}`: a `GET` on the
//! collection returns a JSON object keyed by document id, a `PATCH` on
//! `{base}/{collection}/{id}` merges the given fields into the
//! document, and a `POST` on the collection appends a new document.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use time::OffsetDateTime;

use crate::geo::Coordinates;
use crate::model::{ArchiveRecord, Report, ReportStatus, SosAlert, SosStatus, UserRecord};
use crate::store::{IncidentStore, LocationStore, StoreError};

const USERS: &str = "users";
const SOS_ALERTS: &str = "sos_alerts";
const REPORTS: &str = "reports";
const ANALYTICS_ARCHIVE: &str = "analytics_archive";

/// Client for a hosted document-store backend.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base: String,
    bearer: Option<String>,
}

impl RestStore {
    /// Client against `base`, unauthenticated.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
            bearer: None,
        }
    }

    /// Attach a bearer token to every request.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{collection}", self.base)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{collection}/{id}", self.base)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(StoreError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }

    async fn fetch_collection<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<(String, T)>, StoreError> {
        let response = self
            .authorize(self.client.get(self.collection_url(collection)))
            .send()
            .await?;
        // a BTreeMap keeps document-id order, so iteration is deterministic
        let documents: BTreeMap<String, T> = Self::check(response).await?.json().await?;
        Ok(documents.into_iter().collect())
    }

    async fn fetch_document<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let response = self
            .authorize(self.client.get(self.document_url(collection, id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::check(response).await?.json().await?))
    }

    async fn patch_document<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        fields: &T,
    ) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.patch(self.document_url(collection, id)))
            .json(fields)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::Missing(id.to_owned()));
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn append_document<T: Serialize + Sync>(
        &self,
        collection: &str,
        document: &T,
    ) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.post(self.collection_url(collection)))
            .json(document)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl LocationStore for RestStore {
    async fn fetch_users(&self) -> Result<Vec<(String, UserRecord)>, StoreError> {
        self.fetch_collection(USERS).await
    }

    async fn user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.fetch_document(USERS, id).await
    }

    async fn upsert_user(
        &self,
        id: &str,
        location: Coordinates,
        fcm_token: &str,
        email: &str,
    ) -> Result<(), StoreError> {
        let now = OffsetDateTime::now_utc();
        let last_updated = now.unix_timestamp() * 1000 + i64::from(now.millisecond());
        self.patch_document(
            USERS,
            id,
            &serde_json::json!({
                "location": location,
                "fcmToken": fcm_token,
                "email": email,
                "lastUpdated": last_updated,
            }),
        )
        .await
    }
}

#[async_trait]
impl IncidentStore for RestStore {
    async fn sos_alert(&self, id: &str) -> Result<Option<SosAlert>, StoreError> {
        self.fetch_document(SOS_ALERTS, id).await
    }

    async fn set_sos_status(&self, id: &str, status: SosStatus) -> Result<(), StoreError> {
        self.patch_document(SOS_ALERTS, id, &serde_json::json!({ "status": status }))
            .await
    }

    async fn report(&self, id: &str) -> Result<Option<Report>, StoreError> {
        self.fetch_document(REPORTS, id).await
    }

    async fn set_report_status(&self, id: &str, status: ReportStatus) -> Result<(), StoreError> {
        self.patch_document(REPORTS, id, &serde_json::json!({ "status": status }))
            .await
    }

    async fn archive(&self, record: &ArchiveRecord) -> Result<(), StoreError> {
        self.append_document(ANALYTICS_ARCHIVE, record).await
    }
}

#[cfg(test)]
mod tests {
    use super::RestStore;

    #[test]
    fn urls_are_joined_without_double_slashes() {
        let store = RestStore::new("http://localhost:8080/api/");
        assert_eq!(store.collection_url("users"), "http://localhost:8080/api/users");
        assert_eq!(
            store.document_url("sos_alerts", "sos-1"),
            "http://localhost:8080/api/sos_alerts/sos-1"
        );
    }
}
