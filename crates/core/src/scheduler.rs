//! Periodic notification sweeps.
//!
//! A sweep snapshots every subscriber and, for each lookahead date, resolves the subscriber's
//! stored location, queries availability, filters for their age tier and delivers any
//! non-empty report. Each (subscriber, date) step is isolated: a failure is logged and counted
//! and the sweep moves on.
//!
//! ```text
//! Idle --tick--> Sweeping --done--> Idle --sleep(sweep_interval)--> ...
//! ```

use crate::availability::AvailabilityClient;
use crate::config::NotifierConfig;
use crate::constants::API_DATE_FORMAT;
use crate::delivery::DeliveryChannel;
use crate::intent::LocationToken;
use crate::locations::LocationIndex;
use crate::pacing::Pacer;
use crate::report::{report_title, FilterOutcome, ResultFilter};
use crate::resolver::QueryResolver;
use crate::subscribers::{Subscriber, SubscriberStore};
use crate::{bounded, NotifierError, NotifierResult};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub subscribers: usize,
    /// Availability queries issued.
    pub queries: usize,
    /// Reports delivered.
    pub deliveries: usize,
    /// Queries that produced nothing to deliver.
    pub empty: usize,
    /// Resolve, query or delivery failures.
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Sweeping,
}

pub struct NotificationScheduler {
    resolver: QueryResolver,
    filter: ResultFilter,
    client: Arc<dyn AvailabilityClient>,
    store: Arc<dyn SubscriberStore>,
    channel: Arc<dyn DeliveryChannel>,
    pacer: Arc<dyn Pacer>,
    lookahead_days: Vec<u32>,
    sweep_interval: Duration,
    request_timeout: Duration,
    sweeping: AtomicBool,
}

impl NotificationScheduler {
    pub fn new(
        config: &NotifierConfig,
        index: Arc<LocationIndex>,
        client: Arc<dyn AvailabilityClient>,
        store: Arc<dyn SubscriberStore>,
        channel: Arc<dyn DeliveryChannel>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            resolver: QueryResolver::new(index),
            filter: ResultFilter::new(config.age_policy(), config.report_cap()),
            client,
            store,
            channel,
            pacer,
            lookahead_days: config.lookahead_days().to_vec(),
            sweep_interval: config.sweep_interval(),
            request_timeout: config.request_timeout(),
            sweeping: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.sweeping.load(Ordering::Acquire) {
            SchedulerState::Sweeping
        } else {
            SchedulerState::Idle
        }
    }

    /// Run sweeps until the process shuts down, sleeping `sweep_interval` between the end of
    /// one and the start of the next.
    ///
    /// A sweep that cannot start (the subscriber snapshot fails) is logged and retried on the
    /// next tick. This never returns.
    pub async fn run_forever(&self) {
        tracing::info!(
            interval_secs = self.sweep_interval.as_secs(),
            lookahead = ?self.lookahead_days,
            "scheduler started"
        );
        loop {
            let today = chrono::Local::now().date_naive();
            if let Err(e) = self.run_sweep(today).await {
                tracing::warn!(error = %e, "sweep skipped");
            }
            tokio::time::sleep(self.sweep_interval).await;
        }
    }

    /// Run one sweep for `today`.
    ///
    /// # Errors
    ///
    /// Only fails if the subscriber list cannot be read; everything after that is isolated per
    /// subscriber and date.
    pub async fn run_sweep(&self, today: NaiveDate) -> NotifierResult<SweepSummary> {
        self.sweeping.store(true, Ordering::Release);
        let result = self.sweep(today).await;
        self.sweeping.store(false, Ordering::Release);
        result
    }

    async fn sweep(&self, today: NaiveDate) -> NotifierResult<SweepSummary> {
        let subscribers = self.store.list_all().await?;
        let mut summary = SweepSummary {
            subscribers: subscribers.len(),
            ..SweepSummary::default()
        };
        tracing::info!(subscribers = summary.subscribers, %today, "sweep started");

        self.pacer.reset().await;
        let mut delivered_any = false;

        for subscriber in &subscribers {
            for &offset in &self.lookahead_days {
                let Some(date) = today.checked_add_days(Days::new(u64::from(offset))) else {
                    continue;
                };
                if let Err(e) = self
                    .notify_one(subscriber, date, &mut summary, &mut delivered_any)
                    .await
                {
                    summary.failures += 1;
                    tracing::warn!(
                        user = %subscriber.user_id,
                        date = %date.format(API_DATE_FORMAT),
                        error = %e,
                        "notification step failed"
                    );
                }
            }
        }

        tracing::info!(
            subscribers = summary.subscribers,
            queries = summary.queries,
            deliveries = summary.deliveries,
            empty = summary.empty,
            failures = summary.failures,
            "sweep finished"
        );
        Ok(summary)
    }

    async fn notify_one(
        &self,
        subscriber: &Subscriber,
        date: NaiveDate,
        summary: &mut SweepSummary,
        delivered_any: &mut bool,
    ) -> NotifierResult<()> {
        let resolved = self
            .resolver
            .resolve(&LocationToken::Unspecified, Some(subscriber))?;

        for (target, label) in resolved.target.query_targets() {
            summary.queries += 1;
            let records = bounded(self.request_timeout, self.client.query(&target, date), || {
                NotifierError::ExternalQueryFailed(format!("{target} timed out"))
            })
            .await?;
            tracing::debug!(%target, records = records.len(), "queried");

            let report = match self.filter.filter(
                &records,
                subscriber.age_tier,
                report_title(&label, date),
            ) {
                FilterOutcome::Report(report) => report,
                FilterOutcome::NoRecords | FilterOutcome::NoneForAgeGroup => {
                    summary.empty += 1;
                    continue;
                }
            };

            if *delivered_any {
                self.pacer.pace().await;
            }
            *delivered_any = true;

            bounded(
                self.request_timeout,
                self.channel.notify(&subscriber.user_id, &report),
                || NotifierError::DeliveryFailed(format!("notify {} timed out", subscriber.user_id)),
            )
            .await?;
            summary.deliveries += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::{AvailabilityRecord, Capacity, FeeType, QueryTarget};
    use crate::config::NotifierSettings;
    use crate::delivery::Reply;
    use crate::intent::AgeTier;
    use crate::report::Report;
    use crate::subscribers::{InMemorySubscriberStore, LocationPreference};
    use async_trait::async_trait;
    use notifier_types::{DistrictId, Pincode, UserId};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const FAILING_PIN: &str = "110001";
    const EMPTY_PIN: &str = "560001";

    struct FakeClient;

    #[async_trait]
    impl AvailabilityClient for FakeClient {
        async fn query(
            &self,
            target: &QueryTarget,
            date: NaiveDate,
        ) -> NotifierResult<Vec<AvailabilityRecord>> {
            let pincode = match target {
                QueryTarget::Pincode(pin) if pin.as_str() == FAILING_PIN => {
                    return Err(NotifierError::ExternalQueryFailed("boom".into()))
                }
                QueryTarget::Pincode(pin) if pin.as_str() == EMPTY_PIN => return Ok(Vec::new()),
                QueryTarget::Pincode(pin) => pin.to_string(),
                QueryTarget::District(_) => "411001".to_string(),
            };
            Ok(vec![AvailabilityRecord {
                session_id: None,
                center_name: "PHC".into(),
                district_name: "Pune".into(),
                pincode,
                date,
                min_age_limit: 45,
                capacity: Capacity {
                    total: 5,
                    dose1: Some(5),
                    dose2: None,
                },
                vaccine: "COVISHIELD".into(),
                fee_type: FeeType::Free,
                fee: None,
            }])
        }

        async fn query_calendar(
            &self,
            target: &QueryTarget,
            start: NaiveDate,
        ) -> NotifierResult<Vec<AvailabilityRecord>> {
            self.query(target, start).await
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(UserId, String)>>,
        /// Deliveries to this user fail outright.
        reject: Option<&'static str>,
        /// Deliveries to this user never complete.
        stall: Option<&'static str>,
    }

    #[async_trait]
    impl DeliveryChannel for Recorder {
        async fn notify(&self, user_id: &UserId, report: &Report) -> NotifierResult<()> {
            if self.reject == Some(user_id.as_str()) {
                return Err(NotifierError::DeliveryFailed("bridge refused".into()));
            }
            if self.stall == Some(user_id.as_str()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.sent
                .lock()
                .unwrap()
                .push((user_id.clone(), report.title.clone()));
            Ok(())
        }

        async fn reply(&self, _: &UserId, _: &Reply) -> NotifierResult<()> {
            unreachable!("the scheduler never replies")
        }
    }

    #[derive(Default)]
    struct CountingPacer {
        paces: AtomicUsize,
    }

    #[async_trait]
    impl Pacer for CountingPacer {
        async fn pace(&self) {
            self.paces.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn subscriber(id: &str, pin: &str) -> Subscriber {
        Subscriber {
            user_id: UserId::new(id).unwrap(),
            preference: LocationPreference::Pincode {
                pincode: Pincode::parse(pin).unwrap(),
            },
            age_tier: AgeTier::FortyFivePlus,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 5, 10).unwrap()
    }

    struct Fixture {
        scheduler: NotificationScheduler,
        store: Arc<InMemorySubscriberStore>,
        channel: Arc<Recorder>,
        pacer: Arc<CountingPacer>,
    }

    fn fixture(lookahead: &[u32]) -> Fixture {
        fixture_with(lookahead, Recorder::default())
    }

    fn fixture_with(lookahead: &[u32], channel: Recorder) -> Fixture {
        let store = Arc::new(InMemorySubscriberStore::new());
        let channel = Arc::new(channel);
        let pacer = Arc::new(CountingPacer::default());
        let scheduler = scheduler_over(
            lookahead,
            store.clone(),
            channel.clone(),
            pacer.clone(),
        );
        Fixture {
            scheduler,
            store,
            channel,
            pacer,
        }
    }

    fn scheduler_over(
        lookahead: &[u32],
        store: Arc<dyn SubscriberStore>,
        channel: Arc<dyn DeliveryChannel>,
        pacer: Arc<dyn Pacer>,
    ) -> NotificationScheduler {
        let settings = NotifierSettings {
            lookahead_days: lookahead.to_vec(),
            ..NotifierSettings::default()
        };
        let config = NotifierConfig::new(settings).unwrap();
        let index = Arc::new(LocationIndex::from_entries([("Pune", DistrictId::new(363))]));
        NotificationScheduler::new(&config, index, Arc::new(FakeClient), store, channel, pacer)
    }

    /// Fails the first `list_all`, then behaves like the wrapped store.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemorySubscriberStore,
        list_calls: AtomicUsize,
    }

    #[async_trait]
    impl SubscriberStore for FlakyStore {
        async fn get(&self, user_id: &UserId) -> NotifierResult<Option<Subscriber>> {
            self.inner.get(user_id).await
        }

        async fn upsert(&self, subscriber: Subscriber) -> NotifierResult<()> {
            self.inner.upsert(subscriber).await
        }

        async fn delete(&self, user_id: &UserId) -> NotifierResult<()> {
            self.inner.delete(user_id).await
        }

        async fn list_all(&self) -> NotifierResult<Vec<Subscriber>> {
            if self.list_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(NotifierError::ExternalQueryFailed("store unavailable".into()));
            }
            self.inner.list_all().await
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_per_subscriber() {
        let f = fixture(&[0]);
        f.store.upsert(subscriber("a", FAILING_PIN)).await.unwrap();
        f.store.upsert(subscriber("b", "411001")).await.unwrap();

        let summary = f.scheduler.run_sweep(today()).await.unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                subscribers: 2,
                queries: 2,
                deliveries: 1,
                empty: 0,
                failures: 1,
            }
        );

        let sent = f.channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.as_str(), "b");
        assert_eq!(sent[0].1, "Vaccines Available in 411001 on 10-05-2021");
    }

    #[tokio::test]
    async fn delivery_failure_is_isolated() {
        let f = fixture_with(
            &[0],
            Recorder {
                reject: Some("a"),
                ..Recorder::default()
            },
        );
        f.store.upsert(subscriber("a", "411001")).await.unwrap();
        f.store.upsert(subscriber("b", "411002")).await.unwrap();

        let summary = f.scheduler.run_sweep(today()).await.unwrap();
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.deliveries, 1);

        let sent = f.channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.as_str(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_delivery_times_out_and_sweep_continues() {
        let f = fixture_with(
            &[0],
            Recorder {
                stall: Some("a"),
                ..Recorder::default()
            },
        );
        f.store.upsert(subscriber("a", "411001")).await.unwrap();
        f.store.upsert(subscriber("b", "411002")).await.unwrap();

        let summary = f.scheduler.run_sweep(today()).await.unwrap();
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.deliveries, 1);
        assert_eq!(f.channel.sent.lock().unwrap()[0].0.as_str(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn run_forever_keeps_sweeping_after_store_error() {
        let store = Arc::new(FlakyStore::default());
        store.upsert(subscriber("a", "411001")).await.unwrap();
        let channel = Arc::new(Recorder::default());
        let scheduler = scheduler_over(
            &[0],
            store.clone(),
            channel.clone(),
            Arc::new(CountingPacer::default()),
        );

        // Default interval is 30 minutes, so three hours allows several sweeps.
        let outcome =
            tokio::time::timeout(Duration::from_secs(3 * 3600), scheduler.run_forever()).await;
        assert!(outcome.is_err(), "run_forever must not return");
        assert!(store.list_calls.load(Ordering::SeqCst) >= 2);
        assert!(!channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_lookahead_date_is_queried() {
        let f = fixture(&[0, 7, 14]);
        f.store.upsert(subscriber("a", "411001")).await.unwrap();

        let summary = f.scheduler.run_sweep(today()).await.unwrap();
        assert_eq!(summary.queries, 3);
        assert_eq!(summary.deliveries, 3);

        let titles: Vec<String> = f
            .channel
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect();
        assert_eq!(
            titles,
            vec![
                "Vaccines Available in 411001 on 10-05-2021",
                "Vaccines Available in 411001 on 17-05-2021",
                "Vaccines Available in 411001 on 24-05-2021",
            ]
        );
    }

    #[tokio::test]
    async fn pacing_happens_only_between_deliveries() {
        let f = fixture(&[0, 7]);
        f.store.upsert(subscriber("a", "411001")).await.unwrap();
        f.store.upsert(subscriber("b", EMPTY_PIN)).await.unwrap();
        f.store.upsert(subscriber("c", "411002")).await.unwrap();

        let summary = f.scheduler.run_sweep(today()).await.unwrap();
        assert_eq!(summary.deliveries, 4);
        assert_eq!(summary.empty, 2);
        assert_eq!(f.pacer.paces.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_reports_are_not_delivered() {
        let f = fixture(&[0]);
        f.store.upsert(subscriber("a", EMPTY_PIN)).await.unwrap();
        let mut under45 = subscriber("b", "411001");
        under45.age_tier = AgeTier::Under45;
        f.store.upsert(under45).await.unwrap();

        let summary = f.scheduler.run_sweep(today()).await.unwrap();
        assert_eq!(summary.empty, 2);
        assert_eq!(summary.deliveries, 0);
        assert!(f.channel.sent.lock().unwrap().is_empty());
        assert_eq!(f.pacer.paces.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn district_subscribers_are_queried_by_district() {
        let f = fixture(&[0]);
        f.store
            .upsert(Subscriber {
                user_id: UserId::new("d").unwrap(),
                preference: LocationPreference::District {
                    id: DistrictId::new(363),
                    name: "pune".into(),
                },
                age_tier: AgeTier::FortyFivePlus,
            })
            .await
            .unwrap();

        f.scheduler.run_sweep(today()).await.unwrap();
        let sent = f.channel.sent.lock().unwrap();
        assert_eq!(sent[0].1, "Vaccines Available in Pune on 10-05-2021");
    }

    #[tokio::test]
    async fn state_returns_to_idle() {
        let f = fixture(&[0]);
        assert_eq!(f.scheduler.state(), SchedulerState::Idle);
        f.scheduler.run_sweep(today()).await.unwrap();
        assert_eq!(f.scheduler.state(), SchedulerState::Idle);
    }
}
