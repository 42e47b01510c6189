//! # Notifier Core
//!
//! Core logic for the vaccine slot notifier.
//!
//! This crate contains everything between a raw chat message and an outbound report:
//! - Command interpretation ([`intent`]) and location resolution ([`locations`], [`resolver`])
//! - Availability queries against the CoWIN API ([`availability`], [`cowin`])
//! - Filtering and rendering of results ([`report`])
//! - Subscriber storage ([`subscribers`]) and the periodic sweep ([`scheduler`])
//! - The interactive command path ([`handler`]) and outbound delivery ([`delivery`], [`pacing`])
//!
//! **No transport concerns**: the HTTP server and the CLI live in the `notifier-run` and
//! `notifier-cli` binaries. External systems are reached only through the traits
//! [`AvailabilityClient`], [`SubscriberStore`], [`DeliveryChannel`] and [`OtpGateway`].

pub mod availability;
pub mod config;
pub mod constants;
pub mod cowin;
pub mod delivery;
pub mod error;
pub mod handler;
pub mod intent;
pub mod locations;
pub mod otp;
pub mod pacing;
pub mod report;
pub mod resolver;
pub mod scheduler;
pub mod subscribers;
pub mod validation;

pub use availability::{AvailabilityClient, AvailabilityRecord, QueryTarget};
pub use config::{NotifierConfig, NotifierSettings};
pub use cowin::CowinClient;
pub use delivery::{DeliveryChannel, LogDelivery, Reply, WebhookDelivery};
pub use error::{NotifierError, NotifierResult};
pub use handler::CommandHandler;
pub use intent::{AgeTier, CommandInterpreter, Intent, LocationToken, QueryIntent};
pub use locations::LocationIndex;
pub use otp::OtpGateway;
pub use pacing::{FixedIntervalPacer, NoPacing, Pacer};
pub use report::{AgePolicy, FilterOutcome, Report, ResultFilter};
pub use resolver::QueryResolver;
pub use scheduler::{NotificationScheduler, SweepSummary};
pub use subscribers::{FileSubscriberStore, InMemorySubscriberStore, Subscriber, SubscriberStore};

pub use notifier_types::{DistrictId, MobileNumber, Otp, Pincode, UserId};

use std::future::Future;
use std::time::Duration;

/// Await `fut` for at most `limit`; on expiry return the error built by `on_elapsed`.
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    fut: F,
    on_elapsed: impl FnOnce() -> NotifierError,
) -> NotifierResult<T>
where
    F: Future<Output = NotifierResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| Err(on_elapsed()))
}
