//! Interactive command handling.
//!
//! [`CommandHandler`] is the inbound path: it parses a chat message, runs the matching action
//! and returns the replies. Errors never escape a command; they are turned into a short reply
//! via [`NotifierError::user_message`] so one bad command cannot affect the next.

use crate::availability::AvailabilityClient;
use crate::config::NotifierConfig;
use crate::delivery::{DeliveryChannel, Reply};
use crate::intent::{AgeTier, CommandInterpreter, Intent, LocationToken, QueryIntent};
use crate::locations::LocationIndex;
use crate::otp::{OtpGateway, OtpSessions};
use crate::report::{report_title, FilterOutcome, ResultFilter};
use crate::resolver::QueryResolver;
use crate::subscribers::{Subscriber, SubscriberStore};
use crate::{bounded, NotifierError, NotifierResult};
use chrono::{Days, NaiveDate};
use notifier_types::{MobileNumber, Otp, UserId};
use std::sync::Arc;
use std::time::Duration;

pub struct CommandHandler {
    interpreter: CommandInterpreter,
    resolver: QueryResolver,
    filter: ResultFilter,
    client: Arc<dyn AvailabilityClient>,
    store: Arc<dyn SubscriberStore>,
    otp: Arc<dyn OtpGateway>,
    sessions: OtpSessions,
    request_timeout: Duration,
}

impl CommandHandler {
    pub fn new(
        config: &NotifierConfig,
        index: Arc<LocationIndex>,
        client: Arc<dyn AvailabilityClient>,
        store: Arc<dyn SubscriberStore>,
        otp: Arc<dyn OtpGateway>,
    ) -> Self {
        Self {
            interpreter: CommandInterpreter::new(config.trigger()),
            resolver: QueryResolver::new(index),
            filter: ResultFilter::new(config.age_policy(), config.report_cap()),
            client,
            store,
            otp,
            sessions: OtpSessions::new(config.otp_ttl(), config.token_ttl()),
            request_timeout: config.request_timeout(),
        }
    }

    pub fn interpreter(&self) -> &CommandInterpreter {
        &self.interpreter
    }

    /// Handle one raw message from `user_id`.
    ///
    /// Returns `None` if the message is not addressed to the bot, otherwise the replies in the
    /// order they should be sent (never empty).
    pub async fn handle(
        &self,
        user_id: &UserId,
        raw: &str,
        today: NaiveDate,
    ) -> Option<Vec<Reply>> {
        let intent = self.interpreter.parse(raw)?;
        tracing::debug!(user = %user_id, ?intent, "handling command");
        Some(self.execute(user_id, intent, today).await)
    }

    /// Handle a message and send every reply through `channel`.
    ///
    /// Returns the number of replies sent. Stops at the first delivery failure.
    pub async fn dispatch(
        &self,
        channel: &dyn DeliveryChannel,
        user_id: &UserId,
        raw: &str,
        today: NaiveDate,
    ) -> NotifierResult<usize> {
        let Some(replies) = self.handle(user_id, raw, today).await else {
            return Ok(0);
        };
        for reply in &replies {
            bounded(self.request_timeout, channel.reply(user_id, reply), || {
                NotifierError::DeliveryFailed(format!("reply to {user_id} timed out"))
            })
            .await?;
        }
        Ok(replies.len())
    }

    pub async fn execute(&self, user_id: &UserId, intent: Intent, today: NaiveDate) -> Vec<Reply> {
        let result = match intent {
            Intent::Help => Ok(vec![Reply::text(self.help_text())]),
            Intent::Setup { location, age_tier } => self.setup(user_id, &location, age_tier).await,
            Intent::Unsubscribe => self.unsubscribe(user_id).await,
            Intent::RequestOtp { mobile } => self.request_otp(mobile).await,
            Intent::VerifyOtp { mobile, otp } => self.verify_otp(mobile, otp).await,
            Intent::MeLookup { mobile } => self.me(mobile).await,
            Intent::Query(query) => self.query(user_id, &query, today).await,
        };

        result.unwrap_or_else(|e| {
            tracing::debug!(user = %user_id, error = %e, "command failed");
            vec![Reply::text(e.user_message())]
        })
    }

    fn help_text(&self) -> String {
        let t = self.interpreter.trigger();
        [
            "**Vaccine slot notifier**".to_string(),
            format!("`{t} <pincode> [<pincode>...] [age]` slots today at one or more pincodes"),
            format!("`{t} <district> [age]` slots today in a district"),
            format!("`{t} <n>d ...` or `{t}<n> ...` slots n days from today"),
            format!("`{t}` slots at your saved location"),
            format!("`{t} setup <pincode|district> [age]` save a location for notifications"),
            format!("`{t} unsubscribe` stop notifications"),
            format!("`{t} otp <mobile>` request an OTP"),
            format!("`{t} verify <mobile> <otp>` confirm the OTP"),
            format!("`{t} me <mobile>` list beneficiaries on a verified number"),
            "Ages below 45 search 18+ sessions, anything else 45+.".to_string(),
        ]
        .join("\n")
    }

    async fn setup(
        &self,
        user_id: &UserId,
        location: &LocationToken,
        age_tier: Option<AgeTier>,
    ) -> NotifierResult<Vec<Reply>> {
        let preference = self.resolver.preference_for(location)?;
        let subscriber = Subscriber {
            user_id: user_id.clone(),
            preference,
            age_tier: age_tier.unwrap_or_default(),
        };
        let reply = format!(
            "Notifications set for {} ({} sessions).",
            subscriber.preference.label(),
            subscriber.age_tier
        );
        self.store.upsert(subscriber).await?;
        tracing::info!(user = %user_id, "subscriber saved");
        Ok(vec![Reply::text(reply)])
    }

    async fn unsubscribe(&self, user_id: &UserId) -> NotifierResult<Vec<Reply>> {
        self.store.delete(user_id).await?;
        tracing::info!(user = %user_id, "subscriber removed");
        Ok(vec![Reply::text("Unsubscribed. You will no longer be notified.")])
    }

    async fn request_otp(&self, mobile: Option<MobileNumber>) -> NotifierResult<Vec<Reply>> {
        let mobile = require_mobile(mobile)?;
        let txn_id = bounded(self.request_timeout, self.otp.generate_otp(&mobile), || {
            NotifierError::ExternalQueryFailed("generateOTP timed out".into())
        })
        .await?;
        self.sessions.begin(mobile.clone(), txn_id);

        Ok(vec![Reply::text(format!(
            "OTP sent to {mobile}. Reply with `{} verify {mobile} <otp>` within {} minutes.",
            self.interpreter.trigger(),
            self.sessions.otp_ttl().as_secs().div_ceil(60)
        ))])
    }

    async fn verify_otp(
        &self,
        mobile: Option<MobileNumber>,
        otp: Option<Otp>,
    ) -> NotifierResult<Vec<Reply>> {
        let mobile = require_mobile(mobile)?;
        let otp = otp.ok_or_else(|| {
            NotifierError::InvalidInput(format!("a {}-digit OTP is required", Otp::LEN))
        })?;
        let txn_id = self
            .sessions
            .pending(&mobile)
            .ok_or_else(|| NotifierError::OtpNotRequested(mobile.to_string()))?;

        let token = bounded(
            self.request_timeout,
            self.otp.confirm_otp(&txn_id, &otp),
            || NotifierError::ExternalQueryFailed("confirmOTP timed out".into()),
        )
        .await?;
        self.sessions.complete(mobile.clone(), token);

        Ok(vec![Reply::text(format!("{mobile} verified."))])
    }

    async fn me(&self, mobile: Option<MobileNumber>) -> NotifierResult<Vec<Reply>> {
        let mobile = require_mobile(mobile)?;
        let token = self
            .sessions
            .token(&mobile)
            .ok_or_else(|| NotifierError::NotVerified(mobile.to_string()))?;

        let beneficiaries = bounded(self.request_timeout, self.otp.beneficiaries(&token), || {
            NotifierError::ExternalQueryFailed("beneficiaries timed out".into())
        })
        .await?;

        if beneficiaries.is_empty() {
            return Ok(vec![Reply::text(format!(
                "No beneficiaries registered for {mobile}."
            ))]);
        }

        let mut lines = vec![format!("**Beneficiaries for {mobile}**")];
        lines.extend(beneficiaries.iter().map(|b| {
            let mut line = b.name.clone();
            if !b.birth_year.is_empty() {
                line.push_str(&format!(" (born {})", b.birth_year));
            }
            if !b.vaccination_status.is_empty() {
                line.push_str(&format!(": {}", b.vaccination_status));
            }
            line
        }));
        Ok(vec![Reply::text(lines.join("\n"))])
    }

    async fn query(
        &self,
        user_id: &UserId,
        query: &QueryIntent,
        today: NaiveDate,
    ) -> NotifierResult<Vec<Reply>> {
        // The stored tier still applies to explicit locations.
        let needs_subscriber =
            query.location == LocationToken::Unspecified || query.age_tier.is_none();
        let subscriber = if needs_subscriber {
            self.store.get(user_id).await?
        } else {
            None
        };
        let tier = query
            .age_tier
            .or(subscriber.as_ref().map(|s| s.age_tier))
            .unwrap_or_default();

        let resolved = self.resolver.resolve(&query.location, subscriber.as_ref())?;
        let date = today
            .checked_add_days(Days::new(u64::from(query.date_offset_days)))
            .ok_or_else(|| {
                NotifierError::InvalidInput(format!(
                    "{} days from today is out of range",
                    query.date_offset_days
                ))
            })?;

        let mut replies: Vec<Reply> = resolved
            .rejected
            .iter()
            .map(|candidate| {
                Reply::text(NotifierError::InvalidPincode(candidate.clone()).user_message())
            })
            .collect();

        for (target, label) in resolved.target.query_targets() {
            let records = bounded(self.request_timeout, self.client.query(&target, date), || {
                NotifierError::ExternalQueryFailed(format!("{target} timed out"))
            })
            .await;

            let records = match records {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(%target, error = %e, "availability query failed");
                    replies.push(Reply::text(e.user_message()));
                    continue;
                }
            };

            let when = date.format(crate::constants::API_DATE_FORMAT);
            let reply = match self.filter.filter(&records, tier, report_title(&label, date)) {
                FilterOutcome::NoRecords => {
                    Reply::text(format!("No Vaccination Available at {label} on {when}"))
                }
                FilterOutcome::NoneForAgeGroup => Reply::text(format!(
                    "No Vaccination Available at {label} on {when} for age group {tier}"
                )),
                FilterOutcome::Report(report) => Reply::Report(report),
            };
            replies.push(reply);
        }

        Ok(replies)
    }
}

fn require_mobile(mobile: Option<MobileNumber>) -> NotifierResult<MobileNumber> {
    mobile.ok_or_else(|| {
        NotifierError::InvalidInput(format!(
            "a {}-digit mobile number is required",
            MobileNumber::LEN
        ))
    })
}
