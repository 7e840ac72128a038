//! Documents stored in the hosted collections.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::geo::Coordinates;

pub(crate) mod unix_millis_option {
    //! `lastUpdated` is written by clients as unix milliseconds.

    use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
    use time::OffsetDateTime;

    pub(crate) fn serialize<S>(
        value: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(t) => i64::try_from(t.unix_timestamp_nanos() / 1_000_000)
                .map_err(ser::Error::custom)?
                .serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<i64>::deserialize(deserializer)?
            .map(|millis| {
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                    .map_err(de::Error::custom)
            })
            .transpose()
    }
}

/// A user's last reported position and push registration.
///
/// The document is keyed by user id in the `users` collection and is
/// overwritten whenever the user reports a position; last write wins,
/// no history is kept. Every field may be absent — a record without a
/// position or a push token is never selected as an alert target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Last reported position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinates>,
    /// Push token registered by the user's device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// When the position was last reported, unix milliseconds on the
    /// wire.
    #[serde(
        default,
        with = "unix_millis_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<OffsetDateTime>,
}

/// Lifecycle of an SOS alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SosStatus {
    /// Awaiting operator resolution.
    Active,
    /// Handled by an operator.
    Resolved,
}

/// An emergency ping with a location, awaiting operator resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosAlert {
    /// Document id.
    pub id: String,
    /// Where the ping came from.
    pub location: Coordinates,
    /// How to reach the sender.
    pub contact: String,
    /// Current lifecycle state.
    pub status: SosStatus,
    /// When the ping was raised.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Lifecycle of an incident report. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportStatus {
    /// Submitted, not yet looked at.
    Pending,
    /// An operator is on it.
    InProgress,
    /// An ambulance is on its way.
    AmbulanceDispatched,
    /// Closed out.
    Resolved,
}

impl ReportStatus {
    /// The wire spelling of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "inProgress",
            Self::AmbulanceDispatched => "ambulanceDispatched",
            Self::Resolved => "resolved",
        }
    }

    /// Whether an operator may move a report from `self` to `to`.
    #[must_use]
    pub fn can_advance_to(self, to: Self) -> bool {
        to > self
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a status string is not one of the wire spellings.
#[derive(Debug, Error)]
#[error("unknown report status: {0}")]
pub struct UnknownStatus(String);

impl FromStr for ReportStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "inProgress" => Ok(Self::InProgress),
            "ambulanceDispatched" => Ok(Self::AmbulanceDispatched),
            "resolved" => Ok(Self::Resolved),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// A submitted record of an observed accident or emergency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Document id.
    pub id: String,
    /// Who submitted it.
    pub user_id: String,
    /// How to reach the submitter.
    pub contact: String,
    /// Kind of incident ("accident", "fire", ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form severity as submitted.
    pub severity: String,
    /// Optional headline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional photo attached by the submitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Where it happened.
    pub location: Coordinates,
    /// Current lifecycle state.
    pub status: ReportStatus,
    /// When it was submitted.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// What kind of incident an archive entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    /// Copied from `sos_alerts`.
    Sos,
    /// Copied from `reports`.
    Report,
}

impl ArchiveKind {
    /// The collection the entry was copied from.
    #[must_use]
    pub const fn source(self) -> &'static str {
        match self {
            Self::Sos => "sos_alerts",
            Self::Report => "reports",
        }
    }
}

/// A finished incident, copied into `analytics_archive`.
///
/// The original document is flattened into the entry alongside the
/// bookkeeping fields, so analytics keep every field the incident had.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    /// Id of the archived document.
    pub original_id: String,
    /// Which collection it came from.
    #[serde(rename = "type")]
    pub kind: ArchiveKind,
    /// Name of the source collection.
    pub source: String,
    /// When it was archived.
    #[serde(with = "time::serde::rfc3339")]
    pub archived_at: OffsetDateTime,
    /// The archived document itself.
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

impl ArchiveRecord {
    fn new(
        original_id: &str,
        kind: ArchiveKind,
        mut payload: serde_json::Value,
    ) -> Self {
        if let Some(map) = payload.as_object_mut() {
            // the bookkeeping `type` wins over the document's own
            map.remove("type");
        }
        Self {
            original_id: original_id.to_owned(),
            kind,
            source: kind.source().to_owned(),
            archived_at: OffsetDateTime::now_utc(),
            payload,
        }
    }

    /// Archive entry for a resolved SOS alert.
    ///
    /// # Errors
    ///
    /// Fails if the alert cannot be serialized.
    pub fn sos(alert: &SosAlert) -> Result<Self, serde_json::Error> {
        Ok(Self::new(&alert.id, ArchiveKind::Sos, serde_json::to_value(alert)?))
    }

    /// Archive entry for a resolved report.
    ///
    /// # Errors
    ///
    /// Fails if the report cannot be serialized.
    pub fn report(report: &Report) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            &report.id,
            ArchiveKind::Report,
            serde_json::to_value(report)?,
        ))
    }
}
