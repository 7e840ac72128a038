//! Geofenced fan-out of incident alerts to nearby users.
//!
//! One snapshot read of the `users` collection, a haversine filter,
//! then a bounded concurrent fan-out of push messages. The alert is a
//! best-effort courtesy channel: individual send failures are logged
//! and do not abort sibling sends, and nothing is retried.

use std::time::Duration;

use futures::{stream, StreamExt};
use tracing::{info, warn};

use crate::geo::Coordinates;
use crate::notify::{Notifier, PushMessage};
use crate::store::{LocationStore, StoreError};

/// Default alert radius in kilometers.
pub const DEFAULT_RADIUS_KM: f64 = 2.0;
/// Default number of in-flight sends.
pub const DEFAULT_FAN_OUT: usize = 8;
/// Default per-send deadline.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// A user inside the alert radius.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyUser {
    /// Document id of the user.
    pub id: String,
    /// Great-circle distance from the origin, in kilometers.
    pub distance_km: f64,
    /// Push token the alert will be addressed to.
    pub fcm_token: String,
    /// Contact email, if the record carries one.
    pub email: Option<String>,
}

/// Outcome of one alert fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertOutcome {
    /// Users inside the radius, closest first.
    pub nearby: Vec<NearbyUser>,
    /// Sends handed to the push backend.
    pub attempted: usize,
    /// Sends the backend acknowledged.
    pub delivered: usize,
}

/// Selects users near a point and fans alert messages out to them.
///
/// The store and notifier are injected; radius, fan-out bound and
/// per-send timeout have defaults and can be tuned per alerter.
#[derive(Debug)]
pub struct NearbyAlerter<S, N> {
    store: S,
    notifier: N,
    radius_km: f64,
    fan_out: usize,
    send_timeout: Duration,
}

impl<S, N> NearbyAlerter<S, N>
where
    S: LocationStore,
    N: Notifier,
{
    /// An alerter with the default radius, fan-out and timeout.
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            radius_km: DEFAULT_RADIUS_KM,
            fan_out: DEFAULT_FAN_OUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Set the alert radius in kilometers.
    #[must_use]
    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    /// Bound the number of in-flight sends.
    #[must_use]
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    /// Set the per-send deadline.
    #[must_use]
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Users within the radius of `origin`, closest first.
    ///
    /// Takes one snapshot of the user collection. The excluded user
    /// and records missing a position or a push token are skipped; a
    /// user at exactly the radius is included.
    ///
    /// # Errors
    ///
    /// Fails if the user collection cannot be read.
    pub async fn select_nearby(
        &self,
        origin: Coordinates,
        exclude: Option<&str>,
    ) -> Result<Vec<NearbyUser>, StoreError> {
        let users = self.store.fetch_users().await?;

        let mut nearby: Vec<NearbyUser> = users
            .into_iter()
            .filter_map(|(id, record)| {
                if exclude == Some(id.as_str()) {
                    return None;
                }
                let location = record.location?;
                let fcm_token = record.fcm_token?;
                let distance_km = origin.haversine_km(&location);
                (distance_km <= self.radius_km).then(|| NearbyUser {
                    id,
                    distance_km,
                    fcm_token,
                    email: record.email,
                })
            })
            .collect();

        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(nearby)
    }

    /// Alert every user near a reported accident.
    ///
    /// A failed store read is logged and degrades to an empty
    /// outcome rather than propagating.
    pub async fn alert_accident(&self, origin: Coordinates, location_name: &str) -> AlertOutcome {
        let nearby = match self.select_nearby(origin, None).await {
            Ok(nearby) => nearby,
            Err(e) => {
                warn!("nearby lookup failed: {e}");
                return AlertOutcome::default();
            }
        };

        let messages = nearby
            .iter()
            .map(|user| {
                PushMessage::accident(&user.fcm_token, origin, user.distance_km, location_name)
            })
            .collect();
        self.dispatch(nearby, messages).await
    }

    /// Tell users near `location` that another user is close by.
    ///
    /// The reporting user is never alerted, even at distance zero,
    /// and candidates without a contact email are skipped.
    pub async fn alert_presence(
        &self,
        user_id: &str,
        location: Coordinates,
        email: &str,
    ) -> AlertOutcome {
        let nearby = match self.select_nearby(location, Some(user_id)).await {
            Ok(nearby) => nearby,
            Err(e) => {
                warn!("nearby lookup failed: {e}");
                return AlertOutcome::default();
            }
        };
        let nearby: Vec<NearbyUser> = nearby
            .into_iter()
            .filter(|user| user.email.is_some())
            .collect();

        let messages = nearby
            .iter()
            .map(|user| PushMessage::presence(&user.fcm_token, user.distance_km, email))
            .collect();
        self.dispatch(nearby, messages).await
    }

    /// Hand every message to the notifier, at most `fan_out` in
    /// flight, and wait for all of them to settle.
    async fn dispatch(&self, nearby: Vec<NearbyUser>, messages: Vec<PushMessage>) -> AlertOutcome {
        let attempted = messages.len();
        let delivered = stream::iter(messages)
            .map(|message| async move {
                match tokio::time::timeout(self.send_timeout, self.notifier.send(&message)).await {
                    Ok(Ok(id)) => {
                        info!(%id, "push sent");
                        true
                    }
                    Ok(Err(e)) => {
                        warn!("push send failed: {e}");
                        false
                    }
                    Err(_) => {
                        warn!("push send timed out");
                        false
                    }
                }
            })
            .buffer_unordered(self.fan_out)
            .fold(0_usize, |acc, ok| async move { acc + usize::from(ok) })
            .await;

        info!("notified {delivered} of {attempted} nearby users");
        AlertOutcome {
            nearby,
            attempted,
            delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{AlertOutcome, NearbyAlerter};
    use crate::geo::Coordinates;
    use crate::model::UserRecord;
    use crate::notify::{Notifier, NotifyError, PushMessage};
    use crate::store::{LocationStore, MemoryStore, StoreError};

    const ORIGIN: Coordinates = Coordinates::new(0.0, 0.0);

    #[derive(Debug, Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<PushMessage>>,
        reject: HashSet<String>,
    }

    impl RecordingNotifier {
        fn rejecting(tokens: &[&str]) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                reject: tokens.iter().map(|token| (*token).to_owned()).collect(),
            }
        }

        fn sent(&self) -> Vec<PushMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &PushMessage) -> Result<String, NotifyError> {
            if self.reject.contains(&message.token) {
                return Err(NotifyError::Rejected {
                    status: 404,
                    message: "unregistered token".into(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(message.clone());
            Ok(format!("projects/demo/messages/{}", sent.len()))
        }
    }

    fn user_at(lat: f64, lon: f64, token: &str) -> UserRecord {
        UserRecord {
            location: Some(Coordinates::new(lat, lon)),
            fcm_token: Some(token.to_owned()),
            email: Some(format!("{token}@example.com")),
            last_updated: None,
        }
    }

    fn alerter(store: MemoryStore) -> NearbyAlerter<MemoryStore, RecordingNotifier> {
        NearbyAlerter::new(store, RecordingNotifier::default())
    }

    #[tokio::test]
    async fn selects_only_users_inside_radius() {
        // u1 is ~1.11 km from the origin, u2 ~5.56 km
        let store = MemoryStore::new();
        store.insert_user("u1", user_at(0.0, 0.01, "tok-1"));
        store.insert_user("u2", user_at(0.0, 0.05, "tok-2"));

        let nearby = alerter(store).select_nearby(ORIGIN, None).await.unwrap();

        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].id, "u1");
        assert!((nearby[0].distance_km - 1.11).abs() < 0.02);
    }

    #[tokio::test]
    async fn user_at_exactly_the_radius_is_included() {
        let location = Coordinates::new(0.0, 0.03);
        let store = MemoryStore::new();
        store.insert_user("edge", user_at(location.latitude, location.longitude, "tok"));

        let radius = ORIGIN.haversine_km(&location);
        let alerter = alerter(store).with_radius_km(radius);

        let nearby = alerter.select_nearby(ORIGIN, None).await.unwrap();
        assert_eq!(nearby.len(), 1);
    }

    #[tokio::test]
    async fn originating_user_is_never_selected() {
        let store = MemoryStore::new();
        store.insert_user("me", user_at(0.0, 0.0, "tok-me"));
        store.insert_user("other", user_at(0.0, 0.0, "tok-other"));

        let nearby = alerter(store)
            .select_nearby(ORIGIN, Some("me"))
            .await
            .unwrap();

        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].id, "other");
    }

    #[tokio::test]
    async fn incomplete_records_are_skipped() {
        let store = MemoryStore::new();
        store.insert_user(
            "no-token",
            UserRecord {
                location: Some(ORIGIN),
                ..UserRecord::default()
            },
        );
        store.insert_user(
            "no-location",
            UserRecord {
                fcm_token: Some("tok".into()),
                ..UserRecord::default()
            },
        );

        let nearby = alerter(store).select_nearby(ORIGIN, None).await.unwrap();
        assert!(nearby.is_empty());
    }

    #[tokio::test]
    async fn results_are_sorted_closest_first() {
        let store = MemoryStore::new();
        store.insert_user("far", user_at(0.0, 0.015, "tok-far"));
        store.insert_user("near", user_at(0.0, 0.005, "tok-near"));

        let nearby = alerter(store).select_nearby(ORIGIN, None).await.unwrap();
        let ids: Vec<&str> = nearby.iter().map(|user| user.id.as_str()).collect();
        assert_eq!(ids, ["near", "far"]);
    }

    #[tokio::test]
    async fn empty_store_yields_zero_outcome() {
        let outcome = alerter(MemoryStore::new())
            .alert_accident(ORIGIN, "Nowhere")
            .await;
        assert_eq!(outcome, AlertOutcome::default());
    }

    #[tokio::test]
    async fn failed_sends_do_not_abort_siblings() {
        let store = MemoryStore::new();
        store.insert_user("u1", user_at(0.0, 0.001, "tok-1"));
        store.insert_user("u2", user_at(0.0, 0.002, "tok-2"));
        store.insert_user("u3", user_at(0.0, 0.003, "tok-3"));

        let alerter =
            NearbyAlerter::new(store, RecordingNotifier::rejecting(&["tok-2"]));
        let outcome = alerter.alert_accident(ORIGIN, "Main St").await;

        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.delivered, 2);
        let sent_tokens: Vec<String> = alerter
            .notifier
            .sent()
            .into_iter()
            .map(|message| message.token)
            .collect();
        assert!(sent_tokens.contains(&"tok-1".to_owned()));
        assert!(sent_tokens.contains(&"tok-3".to_owned()));
    }

    #[tokio::test]
    async fn accident_messages_name_the_location() {
        let store = MemoryStore::new();
        store.insert_user("u1", user_at(0.0, 0.01, "tok-1"));

        let alerter = alerter(store);
        let outcome = alerter.alert_accident(ORIGIN, "Main St").await;

        assert_eq!(outcome.delivered, 1);
        let sent = alerter.notifier.sent();
        assert!(sent[0].body.contains("near Main St"));
        assert_eq!(sent[0].data["type"], "ACCIDENT_ALERT");
    }

    #[tokio::test]
    async fn presence_alert_skips_records_without_email() {
        let store = MemoryStore::new();
        store.insert_user("with-email", user_at(0.0, 0.001, "tok-1"));
        store.insert_user(
            "without-email",
            UserRecord {
                email: None,
                ..user_at(0.0, 0.002, "tok-2")
            },
        );

        let alerter = alerter(store);
        let outcome = alerter
            .alert_presence("reporter", ORIGIN, "reporter@example.com")
            .await;

        assert_eq!(outcome.attempted, 1);
        let sent = alerter.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("reporter@example.com"));
        assert_eq!(sent[0].data["type"], "NEARBY_USER");
    }

    #[derive(Debug)]
    struct FailingStore;

    #[async_trait]
    impl LocationStore for FailingStore {
        async fn fetch_users(&self) -> Result<Vec<(String, UserRecord)>, StoreError> {
            Err(StoreError::Rejected {
                status: 503,
                message: "unavailable".into(),
            })
        }

        async fn user(&self, _id: &str) -> Result<Option<UserRecord>, StoreError> {
            Err(StoreError::Rejected {
                status: 503,
                message: "unavailable".into(),
            })
        }

        async fn upsert_user(
            &self,
            _id: &str,
            _location: Coordinates,
            _fcm_token: &str,
            _email: &str,
        ) -> Result<(), StoreError> {
            Err(StoreError::Rejected {
                status: 503,
                message: "unavailable".into(),
            })
        }
    }

    #[tokio::test]
    async fn store_failure_degrades_to_empty_outcome() {
        let alerter = NearbyAlerter::new(FailingStore, RecordingNotifier::default());
        let outcome = alerter.alert_accident(ORIGIN, "Main St").await;
        assert_eq!(outcome, AlertOutcome::default());
    }
}
