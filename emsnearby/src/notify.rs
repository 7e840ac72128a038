//! Push-message construction and delivery.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::geo::Coordinates;

/// An error raised when a push message cannot be delivered.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Transport-level failure.
    #[cfg(feature = "http")]
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The push service answered with a non-success status.
    #[error("push service answered {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },
}

/// A push message addressed to one device token.
///
/// Ephemeral: constructed per dispatch and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    /// Push token of the target device.
    pub token: String,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// String payload handed to the client app.
    pub data: HashMap<String, String>,
}

impl PushMessage {
    /// A bare message with no data payload.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            title: title.into(),
            body: body.into(),
            data: HashMap::new(),
        }
    }

    /// Attach a data entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Alert sent to users near a reported accident.
    #[must_use]
    pub fn accident(
        token: &str,
        origin: Coordinates,
        distance_km: f64,
        location_name: &str,
    ) -> Self {
        Self::new(
            token,
            "🚨 EMS Emergency Alert",
            format!(
                "An accident has been reported {distance_km:.2}km away near {location_name}. \
                 Tap for details."
            ),
        )
        .with_data("type", "ACCIDENT_ALERT")
        .with_data(
            "location",
            serde_json::to_string(&origin).unwrap_or_default(),
        )
        .with_data("locationName", location_name)
        .with_data("distance", format!("{distance_km:.2}"))
    }

    /// Alert telling a user that another user is close by.
    #[must_use]
    pub fn presence(token: &str, distance_km: f64, email: &str) -> Self {
        Self::new(
            token,
            "👋 Nearby User Alert",
            format!("A user ({email}) is {distance_km:.2}km away from your location"),
        )
        .with_data("type", "NEARBY_USER")
        .with_data("distance", format!("{distance_km:.2}"))
        .with_data("userEmail", email)
    }
}

/// A push-messaging backend.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a single message, returning the backend's message id.
    async fn send(&self, message: &PushMessage) -> Result<String, NotifyError>;
}

/// Client for the FCM HTTP v1 send endpoint.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct FcmClient {
    client: reqwest::Client,
    endpoint: String,
    project_id: String,
    bearer: String,
}

#[cfg(feature = "http")]
impl FcmClient {
    /// Hosted endpoint of the messaging service.
    pub const DEFAULT_ENDPOINT: &'static str = "https://fcm.googleapis.com";

    /// Client against the hosted endpoint.
    ///
    /// `bearer` is a pre-issued OAuth token for the project's service
    /// account; minting one is the caller's concern.
    #[must_use]
    pub fn new(project_id: impl Into<String>, bearer: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: Self::DEFAULT_ENDPOINT.to_owned(),
            project_id: project_id.into(),
            bearer: bearer.into(),
        }
    }

    /// Point the client at another endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.endpoint.trim_end_matches('/'),
            self.project_id
        )
    }

    fn envelope(message: &PushMessage) -> serde_json::Value {
        let mut data = message.data.clone();
        data.insert(
            "click_action".to_owned(),
            "FLUTTER_NOTIFICATION_CLICK".to_owned(),
        );
        serde_json::json!({
            "message": {
                "token": message.token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": data,
                "android": { "priority": "high" },
            }
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Notifier for FcmClient {
    async fn send(&self, message: &PushMessage) -> Result<String, NotifyError> {
        #[derive(serde::Deserialize)]
        struct Sent {
            name: String,
        }

        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(&self.bearer)
            .json(&Self::envelope(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let sent: Sent = response.json().await?;
        Ok(sent.name)
    }
}
