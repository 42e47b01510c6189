//! Availability records and the client boundary that produces them.
//!
//! Records are produced fresh for every query and are never cached or persisted.

use crate::NotifierResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use notifier_types::{DistrictId, Pincode};

/// A single location the availability API can be asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    Pincode(Pincode),
    District(DistrictId),
}

impl std::fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryTarget::Pincode(pin) => write!(f, "pincode {pin}"),
            QueryTarget::District(id) => write!(f, "district {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeType {
    Free,
    Paid,
}

impl FeeType {
    /// Anything that is not (case-insensitively) `"Free"` is treated as paid.
    pub fn from_api(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("free") {
            FeeType::Free
        } else {
            FeeType::Paid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capacity {
    pub total: u32,
    pub dose1: Option<u32>,
    pub dose2: Option<u32>,
}

/// One vaccination session at one center on one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityRecord {
    /// Upstream session identifier, when the API reports one.
    pub session_id: Option<String>,
    pub center_name: String,
    pub district_name: String,
    pub pincode: String,
    pub date: NaiveDate,
    pub min_age_limit: u32,
    pub capacity: Capacity,
    /// Empty when unknown.
    pub vaccine: String,
    pub fee_type: FeeType,
    pub fee: Option<String>,
}

/// Source of availability records.
///
/// Any transport or decoding problem surfaces as `NotifierError::ExternalQueryFailed`; an empty
/// vector means the query succeeded and found nothing.
#[async_trait]
pub trait AvailabilityClient: Send + Sync {
    /// Sessions for `target` on exactly `date`.
    async fn query(
        &self,
        target: &QueryTarget,
        date: NaiveDate,
    ) -> NotifierResult<Vec<AvailabilityRecord>>;

    /// Sessions for `target` over a short window (typically a week) starting at `start`.
    async fn query_calendar(
        &self,
        target: &QueryTarget,
        start: NaiveDate,
    ) -> NotifierResult<Vec<AvailabilityRecord>>;
}
