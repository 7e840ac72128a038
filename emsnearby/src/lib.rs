#![warn(
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    missing_debug_implementations,
    unreachable_pub
)]

//! Nearby-user alerting core for an emergency management dashboard.
//!
//! Users report their position into a hosted document store; when an
//! incident comes in, everyone within a small radius of it gets a push
//! message. [`alert::NearbyAlerter`] ties the pieces together: it takes
//! a snapshot of the [`store::LocationStore`], filters it by haversine
//! distance and fans the alerts out through a [`notify::Notifier`] with
//! bounded concurrency and a per-send deadline.
//!
//! ```
//! use emsnearby::alert::NearbyAlerter;
//! use emsnearby::geo::Coordinates;
//! use emsnearby::notify::{Notifier, NotifyError, PushMessage};
//! use emsnearby::store::MemoryStore;
//!
//! struct NullNotifier;
//!
//! #[async_trait::async_trait]
//! impl Notifier for NullNotifier {
//!     async fn send(&self, _message: &PushMessage) -> Result<String, NotifyError> {
//!         Ok(String::new())
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let alerter = NearbyAlerter::new(MemoryStore::new(), NullNotifier);
//! let outcome = alerter
//!     .alert_accident(Coordinates::new(48.8566, 2.3522), "Paris")
//!     .await;
//! assert_eq!(outcome.attempted, 0);
//! # });
//! ```
//!
//! The `http` feature adds the hosted backends: `rest::RestStore` for
//! the document collections and `notify::FcmClient` for push delivery.

pub mod alert;
pub mod geo;
pub mod incident;
pub mod model;
pub mod notify;
#[cfg(feature = "http")]
pub mod rest;
pub mod store;
