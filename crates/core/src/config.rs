//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Binaries read the environment exactly once, through
//! [`NotifierSettings::from_env_values`], and hand the validated [`NotifierConfig`] to the
//! scheduler and the command handler. Nothing in the core reads environment variables while
//! handling a message or running a sweep.

use crate::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_DELIVERY_PACING_MS, DEFAULT_DISTRICTS_FILE,
    DEFAULT_LOOKAHEAD_DAYS, DEFAULT_OTP_TTL_SECS, DEFAULT_REPORT_CAP,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_REST_ADDR, DEFAULT_SUBSCRIBERS_FILE,
    DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_TOKEN_TTL_SECS, DEFAULT_TRIGGER, MAX_DATE_OFFSET_DAYS,
};
use crate::report::AgePolicy;
use crate::validation::{validate_base_url, validate_trigger_word};
use crate::{NotifierError, NotifierResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Raw, unvalidated settings. Every field has a default matching [`crate::constants`].
#[derive(Clone, Debug)]
pub struct NotifierSettings {
    pub trigger: String,
    pub districts_file: PathBuf,
    pub subscribers_file: PathBuf,
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub sweep_interval: Duration,
    pub lookahead_days: Vec<u32>,
    pub delivery_pacing: Duration,
    pub request_timeout: Duration,
    pub report_cap: usize,
    pub age_policy: AgePolicy,
    pub otp_ttl: Duration,
    pub token_ttl: Duration,
    pub webhook_url: Option<String>,
    pub rest_addr: String,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRIGGER.into(),
            districts_file: PathBuf::from(DEFAULT_DISTRICTS_FILE),
            subscribers_file: PathBuf::from(DEFAULT_SUBSCRIBERS_FILE),
            api_base_url: DEFAULT_API_BASE_URL.into(),
            api_token: None,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS.to_vec(),
            delivery_pacing: Duration::from_millis(DEFAULT_DELIVERY_PACING_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            report_cap: DEFAULT_REPORT_CAP,
            age_policy: AgePolicy::Exact,
            otp_ttl: Duration::from_secs(DEFAULT_OTP_TTL_SECS),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            webhook_url: None,
            rest_addr: DEFAULT_REST_ADDR.into(),
        }
    }
}

impl NotifierSettings {
    /// Build settings from a variable lookup, falling back to defaults for unset variables.
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`; tests pass a closure over a map.
    ///
    /// # Errors
    ///
    /// Returns `NotifierError::InvalidInput` if any set variable cannot be parsed.
    pub fn from_env_values(lookup: impl Fn(&str) -> Option<String>) -> NotifierResult<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            trigger: get("NOTIFIER_TRIGGER").unwrap_or(defaults.trigger),
            districts_file: get("NOTIFIER_DISTRICTS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.districts_file),
            subscribers_file: get("NOTIFIER_SUBSCRIBERS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.subscribers_file),
            api_base_url: get("NOTIFIER_API_BASE_URL").unwrap_or(defaults.api_base_url),
            api_token: get("COWIN_TOKEN"),
            sweep_interval: duration_secs_from_env_value(
                get("NOTIFIER_SWEEP_INTERVAL_SECS"),
                defaults.sweep_interval,
            )?,
            lookahead_days: lookahead_days_from_env_value(get("NOTIFIER_LOOKAHEAD_DAYS"))?,
            delivery_pacing: duration_millis_from_env_value(
                get("NOTIFIER_DELIVERY_PACING_MS"),
                defaults.delivery_pacing,
            )?,
            request_timeout: duration_secs_from_env_value(
                get("NOTIFIER_REQUEST_TIMEOUT_SECS"),
                defaults.request_timeout,
            )?,
            report_cap: get("NOTIFIER_REPORT_CAP")
                .map(|v| {
                    v.parse::<usize>().map_err(|_| {
                        NotifierError::InvalidInput(format!("NOTIFIER_REPORT_CAP: {v:?}"))
                    })
                })
                .transpose()?
                .unwrap_or(defaults.report_cap),
            age_policy: age_policy_from_env_value(get("NOTIFIER_AGE_POLICY"))?,
            otp_ttl: duration_secs_from_env_value(get("NOTIFIER_OTP_TTL_SECS"), defaults.otp_ttl)?,
            token_ttl: duration_secs_from_env_value(
                get("NOTIFIER_TOKEN_TTL_SECS"),
                defaults.token_ttl,
            )?,
            webhook_url: get("NOTIFIER_WEBHOOK_URL"),
            rest_addr: get("NOTIFIER_REST_ADDR").unwrap_or(defaults.rest_addr),
        })
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct NotifierConfig {
    settings: NotifierSettings,
}

impl NotifierConfig {
    /// Validate settings and freeze them into a `NotifierConfig`.
    ///
    /// # Errors
    ///
    /// Returns `NotifierError::InvalidInput` if the trigger word is empty or contains
    /// whitespace, the base URL is not http(s), the report cap, request timeout or sweep
    /// interval is zero, or no lookahead days are configured.
    pub fn new(settings: NotifierSettings) -> NotifierResult<Self> {
        validate_trigger_word(&settings.trigger)?;
        validate_base_url(&settings.api_base_url)?;
        if let Some(url) = &settings.webhook_url {
            validate_base_url(url)?;
        }

        if settings.report_cap == 0 {
            return Err(NotifierError::InvalidInput(
                "report cap must be at least 1".into(),
            ));
        }
        if settings.request_timeout.is_zero() {
            return Err(NotifierError::InvalidInput(
                "request timeout must be greater than zero".into(),
            ));
        }
        if settings.sweep_interval.is_zero() {
            return Err(NotifierError::InvalidInput(
                "sweep interval must be greater than zero".into(),
            ));
        }
        if settings.lookahead_days.is_empty() {
            return Err(NotifierError::InvalidInput(
                "at least one lookahead day is required".into(),
            ));
        }

        Ok(Self { settings })
    }

    pub fn trigger(&self) -> &str {
        &self.settings.trigger
    }

    pub fn districts_file(&self) -> &Path {
        &self.settings.districts_file
    }

    pub fn subscribers_file(&self) -> &Path {
        &self.settings.subscribers_file
    }

    pub fn api_base_url(&self) -> &str {
        &self.settings.api_base_url
    }

    pub fn api_token(&self) -> Option<&str> {
        self.settings.api_token.as_deref()
    }

    pub fn sweep_interval(&self) -> Duration {
        self.settings.sweep_interval
    }

    pub fn lookahead_days(&self) -> &[u32] {
        &self.settings.lookahead_days
    }

    pub fn delivery_pacing(&self) -> Duration {
        self.settings.delivery_pacing
    }

    pub fn request_timeout(&self) -> Duration {
        self.settings.request_timeout
    }

    pub fn report_cap(&self) -> usize {
        self.settings.report_cap
    }

    pub fn age_policy(&self) -> AgePolicy {
        self.settings.age_policy
    }

    pub fn otp_ttl(&self) -> Duration {
        self.settings.otp_ttl
    }

    pub fn token_ttl(&self) -> Duration {
        self.settings.token_ttl
    }

    pub fn webhook_url(&self) -> Option<&str> {
        self.settings.webhook_url.as_deref()
    }

    /// Listen address for the REST server, e.g. `0.0.0.0:3000`.
    pub fn rest_addr(&self) -> &str {
        &self.settings.rest_addr
    }
}

/// Parse a comma-separated list of day offsets, e.g. `"0,7,14"`.
///
/// If `value` is `None`, returns [`DEFAULT_LOOKAHEAD_DAYS`]. Duplicates are dropped while
/// keeping the first occurrence's position.
pub fn lookahead_days_from_env_value(value: Option<String>) -> NotifierResult<Vec<u32>> {
    let Some(value) = value else {
        return Ok(DEFAULT_LOOKAHEAD_DAYS.to_vec());
    };

    let mut days = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let day = part
            .parse::<u32>()
            .ok()
            .filter(|d| *d <= MAX_DATE_OFFSET_DAYS)
            .ok_or_else(|| {
                NotifierError::InvalidInput(format!("invalid lookahead day offset: {part:?}"))
            })?;
        if !days.contains(&day) {
            days.push(day);
        }
    }

    Ok(days)
}

/// Parse a whole number of seconds, or return `default` when unset.
pub fn duration_secs_from_env_value(
    value: Option<String>,
    default: Duration,
) -> NotifierResult<Duration> {
    value
        .map(|v| {
            v.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| NotifierError::InvalidInput(format!("invalid seconds value: {v:?}")))
        })
        .transpose()
        .map(|d| d.unwrap_or(default))
}

/// Parse a whole number of milliseconds, or return `default` when unset.
pub fn duration_millis_from_env_value(
    value: Option<String>,
    default: Duration,
) -> NotifierResult<Duration> {
    value
        .map(|v| {
            v.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                NotifierError::InvalidInput(format!("invalid milliseconds value: {v:?}"))
            })
        })
        .transpose()
        .map(|d| d.unwrap_or(default))
}

/// Parse the age-matching policy. `None` yields [`AgePolicy::Exact`].
pub fn age_policy_from_env_value(value: Option<String>) -> NotifierResult<AgePolicy> {
    let parsed = value.map(|v| v.parse::<AgePolicy>()).transpose()?;
    Ok(parsed.unwrap_or(AgePolicy::Exact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let settings = NotifierSettings::from_env_values(lookup(&[])).unwrap();
        let cfg = NotifierConfig::new(settings).unwrap();

        assert_eq!(cfg.trigger(), "!vaccine");
        assert_eq!(cfg.lookahead_days(), &[0, 7, 14]);
        assert_eq!(cfg.report_cap(), 25);
        assert_eq!(cfg.age_policy(), AgePolicy::Exact);
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(1800));
        assert!(cfg.api_token().is_none());
        assert_eq!(cfg.rest_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = NotifierSettings::from_env_values(lookup(&[
            ("NOTIFIER_TRIGGER", "!jab"),
            ("NOTIFIER_LOOKAHEAD_DAYS", "1, 3,3,5"),
            ("NOTIFIER_DELIVERY_PACING_MS", "250"),
            ("NOTIFIER_AGE_POLICY", "eligible"),
            ("COWIN_TOKEN", "secret"),
            ("NOTIFIER_REPORT_CAP", "  "),
            ("NOTIFIER_REST_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();
        let cfg = NotifierConfig::new(settings).unwrap();

        assert_eq!(cfg.trigger(), "!jab");
        assert_eq!(cfg.lookahead_days(), &[1, 3, 5]);
        assert_eq!(cfg.delivery_pacing(), Duration::from_millis(250));
        assert_eq!(cfg.age_policy(), AgePolicy::Eligible);
        assert_eq!(cfg.api_token(), Some("secret"));
        assert_eq!(cfg.report_cap(), 25);
        assert_eq!(cfg.rest_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(lookahead_days_from_env_value(Some("0,x".into())).is_err());
        assert!(lookahead_days_from_env_value(Some("1000".into())).is_err());
        assert!(duration_secs_from_env_value(Some("-1".into()), Duration::ZERO).is_err());
        assert!(age_policy_from_env_value(Some("sometimes".into())).is_err());
    }

    #[test]
    fn config_validation_rejects_unusable_settings() {
        let mut settings = NotifierSettings::default();
        settings.trigger = "two words".into();
        assert!(NotifierConfig::new(settings).is_err());

        let mut settings = NotifierSettings::default();
        settings.lookahead_days.clear();
        assert!(NotifierConfig::new(settings).is_err());

        let mut settings = NotifierSettings::default();
        settings.report_cap = 0;
        assert!(NotifierConfig::new(settings).is_err());

        let mut settings = NotifierSettings::default();
        settings.webhook_url = Some("ftp://example.com".into());
        assert!(NotifierConfig::new(settings).is_err());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let settings = NotifierSettings::from_env_values(lookup(&[(
            "NOTIFIER_SWEEP_INTERVAL_SECS",
            "0",
        )]))
        .unwrap();
        let err = NotifierConfig::new(settings).unwrap_err();
        assert!(matches!(err, NotifierError::InvalidInput(msg) if msg.contains("sweep interval")));
    }
}
