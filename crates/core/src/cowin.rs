//! HTTP client for the public CoWIN API.
//!
//! Implements [`AvailabilityClient`] and [`OtpGateway`], plus the admin location endpoints used
//! to build the district index. Response bodies are decoded by the free `parse_*` functions so
//! the wire handling can be tested without a network.
//!
//! Endpoints used (relative to the configured base URL):
//!
//! | Purpose | Endpoint |
//! |---|---|
//! | states | `GET admin/location/states` |
//! | districts | `GET admin/location/districts/{state_id}` |
//! | sessions on a date | `GET appointment/sessions/public/findByPin` / `findByDistrict` |
//! | 7-day calendar | `GET appointment/sessions/public/calendarByPin` / `calendarByDistrict` |
//! | OTP | `POST auth/public/generateOTP`, `POST auth/public/confirmOTP` |
//! | beneficiaries | `GET appointment/beneficiaries` |

use crate::availability::{AvailabilityClient, AvailabilityRecord, Capacity, FeeType, QueryTarget};
use crate::constants::{API_DATE_FORMAT, HTTP_USER_AGENT};
use crate::locations::{DistrictEntry, DistrictsDocument};
use crate::otp::{Beneficiary, OtpGateway};
use crate::{NotifierError, NotifierResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use notifier_types::{MobileNumber, Otp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// A state as listed by the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StateEntry {
    pub state_id: u32,
    pub state_name: String,
}

#[derive(Debug, Clone)]
pub struct CowinClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl CowinClient {
    /// Create a client. `timeout` bounds every request end to end.
    ///
    /// # Errors
    ///
    /// Returns `ExternalQueryFailed` if the HTTP client cannot be built (e.g. TLS backend
    /// initialisation fails).
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> NotifierResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(HTTP_USER_AGENT)
            .build()
            .map_err(|e| NotifierError::ExternalQueryFailed(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_text(
        &self,
        path: &str,
        query: &[(&str, String)],
        bearer: Option<&str>,
    ) -> NotifierResult<String> {
        let mut request = self.http.get(self.url(path)).query(query);
        if let Some(token) = bearer.or(self.token.as_deref()) {
            request = request.bearer_auth(token);
        }
        send(request, path).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> NotifierResult<T> {
        let mut request = self.http.post(self.url(path)).json(body);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }
        let text = send(request, path).await?;
        decode(&text, path)
    }

    pub async fn states(&self) -> NotifierResult<Vec<StateEntry>> {
        #[derive(Deserialize)]
        struct StatesDocument {
            #[serde(default)]
            states: Vec<StateEntry>,
        }

        let path = "admin/location/states";
        let text = self.get_text(path, &[], None).await?;
        Ok(decode::<StatesDocument>(&text, path)?.states)
    }

    pub async fn districts(&self, state_id: u32) -> NotifierResult<Vec<DistrictEntry>> {
        let path = format!("admin/location/districts/{state_id}");
        let text = self.get_text(&path, &[], None).await?;
        Ok(decode::<DistrictsDocument>(&text, &path)?.districts)
    }

    /// Every district of every state, in API order (states first, then districts within).
    pub async fn fetch_all_districts(&self) -> NotifierResult<Vec<DistrictEntry>> {
        let mut all = Vec::new();
        for state in self.states().await? {
            let districts = self.districts(state.state_id).await?;
            tracing::debug!(
                state = %state.state_name,
                districts = districts.len(),
                "fetched districts"
            );
            all.extend(districts);
        }
        Ok(all)
    }
}

#[async_trait]
impl AvailabilityClient for CowinClient {
    async fn query(
        &self,
        target: &QueryTarget,
        date: NaiveDate,
    ) -> NotifierResult<Vec<AvailabilityRecord>> {
        let (path, key, value) = match target {
            QueryTarget::Pincode(pin) => (
                "appointment/sessions/public/findByPin",
                "pincode",
                pin.to_string(),
            ),
            QueryTarget::District(id) => (
                "appointment/sessions/public/findByDistrict",
                "district_id",
                id.to_string(),
            ),
        };
        let query = [(key, value), ("date", date.format(API_DATE_FORMAT).to_string())];
        let text = self.get_text(path, &query, None).await?;
        parse_sessions(&text)
    }

    async fn query_calendar(
        &self,
        target: &QueryTarget,
        start: NaiveDate,
    ) -> NotifierResult<Vec<AvailabilityRecord>> {
        let (path, key, value) = match target {
            QueryTarget::Pincode(pin) => (
                "appointment/sessions/public/calendarByPin",
                "pincode",
                pin.to_string(),
            ),
            QueryTarget::District(id) => (
                "appointment/sessions/public/calendarByDistrict",
                "district_id",
                id.to_string(),
            ),
        };
        let query = [(key, value), ("date", start.format(API_DATE_FORMAT).to_string())];
        let text = self.get_text(path, &query, None).await?;
        parse_calendar(&text)
    }
}

#[async_trait]
impl OtpGateway for CowinClient {
    async fn generate_otp(&self, mobile: &MobileNumber) -> NotifierResult<String> {
        #[derive(Serialize)]
        struct Req<'a> {
            mobile: &'a str,
        }
        #[derive(Deserialize)]
        struct Res {
            #[serde(rename = "txnId")]
            txn_id: String,
        }

        let res: Res = self
            .post_json(
                "auth/public/generateOTP",
                &Req {
                    mobile: mobile.as_str(),
                },
            )
            .await?;
        Ok(res.txn_id)
    }

    async fn confirm_otp(&self, txn_id: &str, otp: &Otp) -> NotifierResult<String> {
        #[derive(Serialize)]
        struct Req<'a> {
            otp: String,
            #[serde(rename = "txnId")]
            txn_id: &'a str,
        }
        #[derive(Deserialize)]
        struct Res {
            token: String,
        }

        let res: Res = self
            .post_json(
                "auth/public/confirmOTP",
                &Req {
                    otp: hash_otp(otp),
                    txn_id,
                },
            )
            .await?;
        Ok(res.token)
    }

    async fn beneficiaries(&self, token: &str) -> NotifierResult<Vec<Beneficiary>> {
        #[derive(Deserialize)]
        struct Res {
            #[serde(default)]
            beneficiaries: Vec<Beneficiary>,
        }

        let path = "appointment/beneficiaries";
        let text = self.get_text(path, &[], Some(token)).await?;
        Ok(decode::<Res>(&text, path)?.beneficiaries)
    }
}

async fn send(request: reqwest::RequestBuilder, path: &str) -> NotifierResult<String> {
    let response = request
        .send()
        .await
        .map_err(|e| NotifierError::ExternalQueryFailed(format!("{path}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(NotifierError::ExternalQueryFailed(format!(
            "{path} returned {status}"
        )));
    }

    response
        .text()
        .await
        .map_err(|e| NotifierError::ExternalQueryFailed(format!("{path}: {e}")))
}

fn decode<T: DeserializeOwned>(text: &str, path: &str) -> NotifierResult<T> {
    serde_json::from_str(text)
        .map_err(|e| NotifierError::ExternalQueryFailed(format!("{path}: malformed response: {e}")))
}

/// The API expects the SHA-256 of the OTP, hex encoded, rather than the OTP itself.
pub fn hash_otp(otp: &Otp) -> String {
    hex::encode(Sha256::digest(otp.as_str().as_bytes()))
}

// ============================================================================
// WIRE FORMATS
// ============================================================================

#[derive(Deserialize)]
struct SessionsDocument {
    #[serde(default)]
    sessions: Vec<SessionWire>,
}

#[derive(Deserialize)]
struct SessionWire {
    #[serde(default)]
    session_id: Option<String>,
    name: String,
    #[serde(default)]
    district_name: String,
    pincode: u32,
    date: String,
    min_age_limit: u32,
    #[serde(default)]
    available_capacity: u32,
    #[serde(default)]
    available_capacity_dose1: Option<u32>,
    #[serde(default)]
    available_capacity_dose2: Option<u32>,
    #[serde(default)]
    vaccine: String,
    #[serde(default)]
    fee_type: String,
    #[serde(default)]
    fee: Option<String>,
}

#[derive(Deserialize)]
struct CentersDocument {
    #[serde(default)]
    centers: Vec<CenterWire>,
}

#[derive(Deserialize)]
struct CenterWire {
    name: String,
    #[serde(default)]
    district_name: String,
    pincode: u32,
    #[serde(default)]
    fee_type: String,
    #[serde(default)]
    sessions: Vec<CalendarSessionWire>,
    #[serde(default)]
    vaccine_fees: Vec<VaccineFeeWire>,
}

#[derive(Deserialize)]
struct CalendarSessionWire {
    #[serde(default)]
    session_id: Option<String>,
    date: String,
    min_age_limit: u32,
    #[serde(default)]
    available_capacity: u32,
    #[serde(default)]
    available_capacity_dose1: Option<u32>,
    #[serde(default)]
    available_capacity_dose2: Option<u32>,
    #[serde(default)]
    vaccine: String,
}

#[derive(Deserialize)]
struct VaccineFeeWire {
    vaccine: String,
    fee: String,
}

fn parse_api_date(value: &str) -> NotifierResult<NaiveDate> {
    NaiveDate::parse_from_str(value, API_DATE_FORMAT).map_err(|e| {
        NotifierError::ExternalQueryFailed(format!("invalid session date {value:?}: {e}"))
    })
}

/// Decode a `findByPin` / `findByDistrict` response body.
pub fn parse_sessions(body: &str) -> NotifierResult<Vec<AvailabilityRecord>> {
    let document: SessionsDocument = decode(body, "sessions")?;
    document
        .sessions
        .into_iter()
        .map(|s| {
            Ok(AvailabilityRecord {
                session_id: s.session_id,
                center_name: s.name,
                district_name: s.district_name,
                pincode: format!("{:06}", s.pincode),
                date: parse_api_date(&s.date)?,
                min_age_limit: s.min_age_limit,
                capacity: Capacity {
                    total: s.available_capacity,
                    dose1: s.available_capacity_dose1,
                    dose2: s.available_capacity_dose2,
                },
                vaccine: s.vaccine,
                fee_type: FeeType::from_api(&s.fee_type),
                fee: s.fee,
            })
        })
        .collect()
}

/// Decode a `calendarByPin` / `calendarByDistrict` response body, flattening centers into one
/// record per session. Fees come from the center's `vaccine_fees` entry for the session's
/// vaccine.
pub fn parse_calendar(body: &str) -> NotifierResult<Vec<AvailabilityRecord>> {
    let document: CentersDocument = decode(body, "calendar")?;
    let mut records = Vec::new();

    for center in document.centers {
        let fee_type = FeeType::from_api(&center.fee_type);
        for session in &center.sessions {
            let fee = center
                .vaccine_fees
                .iter()
                .find(|f| f.vaccine.eq_ignore_ascii_case(&session.vaccine))
                .map(|f| f.fee.clone());

            records.push(AvailabilityRecord {
                session_id: session.session_id.clone(),
                center_name: center.name.clone(),
                district_name: center.district_name.clone(),
                pincode: format!("{:06}", center.pincode),
                date: parse_api_date(&session.date)?,
                min_age_limit: session.min_age_limit,
                capacity: Capacity {
                    total: session.available_capacity,
                    dose1: session.available_capacity_dose1,
                    dose2: session.available_capacity_dose2,
                },
                vaccine: session.vaccine.clone(),
                fee_type,
                fee,
            });
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_find_by_pin_sessions() {
        let body = r#"{
            "sessions": [
                {
                    "center_id": 1234,
                    "name": "District General Hospital",
                    "district_name": "Satara",
                    "pincode": 415001,
                    "fee_type": "Paid",
                    "fee": "250",
                    "session_id": "3fa85f64",
                    "date": "31-05-2021",
                    "available_capacity": 50,
                    "available_capacity_dose1": 25,
                    "available_capacity_dose2": 25,
                    "min_age_limit": 18,
                    "vaccine": "COVISHIELD",
                    "slots": ["FORENOON", "AFTERNOON"]
                },
                {
                    "name": "PHC",
                    "pincode": 15001,
                    "date": "31-05-2021",
                    "min_age_limit": 45
                }
            ]
        }"#;

        let records = parse_sessions(body).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.session_id.as_deref(), Some("3fa85f64"));
        assert_eq!(first.center_name, "District General Hospital");
        assert_eq!(first.pincode, "415001");
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2021, 5, 31).unwrap());
        assert_eq!(first.capacity.dose1, Some(25));
        assert_eq!(first.fee_type, FeeType::Paid);
        assert_eq!(first.fee.as_deref(), Some("250"));

        let second = &records[1];
        assert_eq!(second.pincode, "015001");
        assert_eq!(second.capacity, Capacity::default());
        assert_eq!(second.vaccine, "");
        assert_eq!(second.fee_type, FeeType::Paid);
    }

    #[test]
    fn empty_sessions_document() {
        assert!(parse_sessions(r#"{"sessions": []}"#).unwrap().is_empty());
        assert!(parse_sessions("{}").unwrap().is_empty());
    }

    #[test]
    fn malformed_bodies_are_external_failures() {
        assert!(matches!(
            parse_sessions("<html>busy</html>"),
            Err(NotifierError::ExternalQueryFailed(_))
        ));
        let bad_date = r#"{"sessions":[{"name":"X","pincode":110001,"date":"2021-05-31","min_age_limit":18}]}"#;
        assert!(matches!(
            parse_sessions(bad_date),
            Err(NotifierError::ExternalQueryFailed(_))
        ));
    }

    #[test]
    fn calendar_flattens_centers_and_matches_fees() {
        let body = r#"{
            "centers": [
                {
                    "center_id": 1,
                    "name": "Apollo",
                    "district_name": "Pune",
                    "pincode": 411001,
                    "fee_type": "Paid",
                    "sessions": [
                        {"session_id": "a", "date": "10-05-2021", "available_capacity": 5,
                         "min_age_limit": 18, "vaccine": "COVAXIN"},
                        {"session_id": "b", "date": "11-05-2021", "available_capacity": 0,
                         "min_age_limit": 45, "vaccine": "COVISHIELD"}
                    ],
                    "vaccine_fees": [
                        {"vaccine": "COVAXIN", "fee": "1200"},
                        {"vaccine": "COVISHIELD", "fee": "780"}
                    ]
                },
                {
                    "center_id": 2,
                    "name": "PHC",
                    "district_name": "Pune",
                    "pincode": 411002,
                    "fee_type": "Free",
                    "sessions": [
                        {"date": "10-05-2021", "min_age_limit": 45, "vaccine": "COVISHIELD"}
                    ]
                }
            ]
        }"#;

        let records = parse_calendar(body).unwrap();
        let summary: Vec<_> = records
            .iter()
            .map(|r| (r.center_name.as_str(), r.min_age_limit, r.fee.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Apollo", 18, Some("1200")),
                ("Apollo", 45, Some("780")),
                ("PHC", 45, None),
            ]
        );
        assert_eq!(records[2].fee_type, FeeType::Free);
    }

    #[test]
    fn otp_is_sent_hashed() {
        let otp = Otp::parse("123456").unwrap();
        assert_eq!(
            hash_otp(&otp),
            "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client =
            CowinClient::new("https://example.com/api/v2/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url("admin/location/states"),
            "https://example.com/api/v2/admin/location/states"
        );
    }
}
