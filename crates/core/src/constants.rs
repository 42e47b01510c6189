//! Constants used throughout the notifier core crate.
//!
//! Defaults for every runtime setting live here so the config layer, the CLI and the tests agree
//! on them.

/// Word that must open every chat message addressed to the bot.
pub const DEFAULT_TRIGGER: &str = "!vaccine";

/// Default location of the district index file (CoWIN `districts` JSON shape).
pub const DEFAULT_DISTRICTS_FILE: &str = "data/districts.json";

/// Default location of the subscriber store.
pub const DEFAULT_SUBSCRIBERS_FILE: &str = "data/subscribers.yaml";

/// Base URL of the public availability API.
pub const DEFAULT_API_BASE_URL: &str = "https://cdn-api.co-vin.in/api/v2";

/// Delay between the end of one sweep and the start of the next.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30 * 60;

/// Day offsets queried for every subscriber on each sweep.
pub const DEFAULT_LOOKAHEAD_DAYS: &[u32] = &[0, 7, 14];

/// Minimum gap between two outbound notifications.
pub const DEFAULT_DELIVERY_PACING_MS: u64 = 1_000;

/// Upper bound on any single external call (availability query, OTP, delivery).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Maximum number of entries in one report.
pub const DEFAULT_REPORT_CAP: usize = 25;

/// Lifetime of a pending OTP transaction.
pub const DEFAULT_OTP_TTL_SECS: u64 = 3 * 60;

/// Lifetime of a verified session token.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 15 * 60;

/// Listen address of the REST server.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Largest day offset a query may ask for (`<n>d` accepts up to three digits).
pub const MAX_DATE_OFFSET_DAYS: u32 = 999;

/// Date format expected and returned by the availability API.
pub const API_DATE_FORMAT: &str = "%d-%m-%Y";

/// Shown in place of a per-dose capacity the API did not report.
pub const MISSING_DOSE_SENTINEL: &str = "N/A";

/// Footer appended to rendered reports.
pub const REPORT_FOOTER: &str = "Source: CoWin API";

/// User agent sent to the availability API.
pub const HTTP_USER_AGENT: &str = concat!("notifier/", env!("CARGO_PKG_VERSION"));
