use anyhow::Context;
use emsnearby::alert::NearbyAlerter;
use emsnearby::geo::Coordinates;
use emsnearby::incident::IncidentDesk;
use emsnearby::model::ReportStatus;
use emsnearby::notify::FcmClient;
use emsnearby::rest::RestStore;
use reverse_geocoder::{Locations, ReverseGeocoder};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
#[structopt(name = "emsalert", about = "Push alerts to users near an emergency")]
enum Command {
    /// Alert users near a reported accident.
    Accident {
        #[structopt(long)]
        lat: f64,
        #[structopt(long)]
        lon: f64,
        /// Alert radius in kilometers.
        #[structopt(long, default_value = "2")]
        radius: f64,
        /// Skip reverse geocoding and use this location name.
        #[structopt(long)]
        location_name: Option<String>,
    },
    /// Tell nearby users that a user has reported their position.
    Presence {
        #[structopt(long)]
        user_id: String,
        #[structopt(long)]
        email: String,
        #[structopt(long)]
        lat: f64,
        #[structopt(long)]
        lon: f64,
        /// Alert radius in kilometers.
        #[structopt(long, default_value = "2")]
        radius: f64,
    },
    /// Mark an SOS alert resolved and archive it.
    ResolveSos {
        #[structopt(long)]
        id: String,
    },
    /// Move an incident report to a new status.
    Report {
        #[structopt(long)]
        id: String,
        /// One of pending, inProgress, ambulanceDispatched, resolved.
        #[structopt(long)]
        status: ReportStatus,
    },
}

fn store_from_env() -> anyhow::Result<RestStore> {
    let base = std::env::var("EMS_STORE_URL").context("EMS_STORE_URL is not set")?;
    let mut store = RestStore::new(base);
    if let Ok(token) = std::env::var("EMS_STORE_TOKEN") {
        store = store.with_bearer(token);
    }
    Ok(store)
}

fn fcm_from_env() -> anyhow::Result<FcmClient> {
    let project_id = std::env::var("FCM_PROJECT_ID").context("FCM_PROJECT_ID is not set")?;
    let bearer = std::env::var("FCM_TOKEN").context("FCM_TOKEN is not set")?;
    let mut client = FcmClient::new(project_id, bearer);
    if let Ok(endpoint) = std::env::var("FCM_ENDPOINT") {
        client = client.with_endpoint(endpoint);
    }
    Ok(client)
}

/// Name the incident location from the bundled places index.
fn locate(origin: Coordinates) -> String {
    let locations = Locations::from_memory();
    let geocoder = ReverseGeocoder::new(&locations);
    let record = geocoder
        .search((origin.latitude, origin.longitude))
        .unwrap()
        .record;
    format!("{}, {}, {}", record.name, record.admin1, record.cc)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let command = Command::from_args();
    let store = store_from_env()?;

    match command {
        Command::Accident {
            lat,
            lon,
            radius,
            location_name,
        } => {
            let origin = Coordinates::new(lat, lon);
            let location_name = location_name.unwrap_or_else(|| locate(origin));
            let alerter =
                NearbyAlerter::new(store, fcm_from_env()?).with_radius_km(radius);
            let outcome = alerter.alert_accident(origin, &location_name).await;
            println!(
                "notified {} of {} users near {location_name}",
                outcome.delivered, outcome.attempted
            );
        }
        Command::Presence {
            user_id,
            email,
            lat,
            lon,
            radius,
        } => {
            let alerter =
                NearbyAlerter::new(store, fcm_from_env()?).with_radius_km(radius);
            let outcome = alerter
                .alert_presence(&user_id, Coordinates::new(lat, lon), &email)
                .await;
            println!(
                "notified {} of {} users near {email}",
                outcome.delivered, outcome.attempted
            );
        }
        Command::ResolveSos { id } => {
            IncidentDesk::new(store).resolve_sos(&id).await?;
            println!("sos alert {id} resolved and archived");
        }
        Command::Report { id, status } => {
            IncidentDesk::new(store).advance_report(&id, status).await?;
            println!("report {id} moved to {status}");
        }
    }

    Ok(())
}
