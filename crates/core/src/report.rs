//! Age filtering, de-duplication, capping and rendering of availability records.
//!
//! ## Age policy
//!
//! [`AgePolicy::Exact`] keeps only sessions whose `min_age_limit` equals the tier threshold, so
//! a 45+ subscriber does not see 18+ sessions they are also eligible for. This is the
//! long-standing behaviour and stays the default. [`AgePolicy::Eligible`] keeps every session
//! whose minimum age is at or below the threshold.

use crate::availability::{AvailabilityRecord, FeeType};
use crate::constants::{API_DATE_FORMAT, MISSING_DOSE_SENTINEL, REPORT_FOOTER};
use crate::intent::AgeTier;
use crate::NotifierError;
use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgePolicy {
    #[default]
    Exact,
    Eligible,
}

impl FromStr for AgePolicy {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(AgePolicy::Exact),
            "eligible" => Ok(AgePolicy::Eligible),
            other => Err(NotifierError::InvalidInput(format!(
                "unknown age policy {other:?} (expected \"exact\" or \"eligible\")"
            ))),
        }
    }
}

/// One rendered record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub heading: String,
    pub body: String,
}

/// Capped, filtered, formatted result of one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub title: String,
    pub entries: Vec<ReportEntry>,
}

impl Report {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plain-text rendering for transports without rich embeds.
    pub fn render_text(&self) -> String {
        let mut out = format!("**{}**\n", self.title);
        for entry in &self.entries {
            out.push('\n');
            out.push_str(&entry.heading);
            out.push('\n');
            out.push_str(&entry.body);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(REPORT_FOOTER);
        out
    }
}

/// What a filter pass produced.
///
/// `NoRecords` and `NoneForAgeGroup` are kept apart so callers can tell "nothing on this date"
/// from "nothing for your age group".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    NoRecords,
    NoneForAgeGroup,
    Report(Report),
}

#[derive(Debug, Clone, Copy)]
pub struct ResultFilter {
    policy: AgePolicy,
    cap: usize,
}

impl ResultFilter {
    pub fn new(policy: AgePolicy, cap: usize) -> Self {
        Self { policy, cap }
    }

    pub fn policy(&self) -> AgePolicy {
        self.policy
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn matches(&self, record: &AvailabilityRecord, tier: AgeTier) -> bool {
        match self.policy {
            AgePolicy::Exact => record.min_age_limit == tier.threshold(),
            AgePolicy::Eligible => record.min_age_limit <= tier.threshold(),
        }
    }

    /// Filter `records` for `tier`, keeping source order, dropping duplicates and truncating to
    /// the cap.
    pub fn filter(
        &self,
        records: &[AvailabilityRecord],
        tier: AgeTier,
        title: impl Into<String>,
    ) -> FilterOutcome {
        if records.is_empty() {
            return FilterOutcome::NoRecords;
        }

        let mut seen = HashSet::new();
        let entries: Vec<ReportEntry> = records
            .iter()
            .filter(|r| self.matches(r, tier))
            .filter(|r| seen.insert(dedup_key(r)))
            .take(self.cap)
            .map(render_entry)
            .collect();

        if entries.is_empty() {
            return FilterOutcome::NoneForAgeGroup;
        }

        FilterOutcome::Report(Report {
            title: title.into(),
            entries,
        })
    }
}

impl Default for ResultFilter {
    fn default() -> Self {
        Self::new(AgePolicy::Exact, crate::constants::DEFAULT_REPORT_CAP)
    }
}

fn dedup_key(record: &AvailabilityRecord) -> String {
    match &record.session_id {
        Some(id) => format!("session:{id}"),
        None => format!(
            "{}|{}|{}|{}|{}",
            record.center_name, record.pincode, record.date, record.min_age_limit, record.vaccine
        ),
    }
}

/// Render one record as a report entry.
pub fn render_entry(record: &AvailabilityRecord) -> ReportEntry {
    let heading = if record.district_name.is_empty() {
        record.center_name.clone()
    } else {
        format!("{}, {}", record.center_name, record.district_name)
    };

    let dose = |d: Option<u32>| {
        d.map(|n| n.to_string())
            .unwrap_or_else(|| MISSING_DOSE_SENTINEL.to_string())
    };
    let fees = match (record.fee_type, record.fee.as_deref()) {
        (FeeType::Free, _) => "Free".to_string(),
        (FeeType::Paid, Some(fee)) if !fee.trim().is_empty() => format!("Paid (₹{})", fee.trim()),
        (FeeType::Paid, _) => "Paid".to_string(),
    };

    let body = [
        format!("Date: {}", record.date.format(API_DATE_FORMAT)),
        format!("Pincode: {}", record.pincode),
        format!("Minimum Age: {}+", record.min_age_limit),
        format!(
            "Shots Available: {} (Dose 1: {}, Dose 2: {})",
            record.capacity.total,
            dose(record.capacity.dose1),
            dose(record.capacity.dose2)
        ),
        format!("Vaccine Type: {}", record.vaccine),
        format!("Fees: {fees}"),
    ]
    .join("\n");

    ReportEntry { heading, body }
}

/// Title used for reports about one location on one date.
pub fn report_title(label: &str, date: chrono::NaiveDate) -> String {
    format!(
        "Vaccines Available in {} on {}",
        label,
        date.format(API_DATE_FORMAT)
    )
}
