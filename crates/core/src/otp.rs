//! One-time-password transactions and short-lived session tokens.
//!
//! Both are credentials with a short natural lifetime, so they live only in process memory, in
//! a [`TtlCache`] keyed by mobile number, and are never written to disk.

use crate::NotifierResult;
use async_trait::async_trait;
use notifier_types::{MobileNumber, Otp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A person registered under a verified mobile number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub beneficiary_reference_id: String,
    pub name: String,
    #[serde(default)]
    pub birth_year: String,
    #[serde(default)]
    pub vaccination_status: String,
}

/// Upstream OTP issuance and verification.
#[async_trait]
pub trait OtpGateway: Send + Sync {
    /// Ask upstream to send an OTP to `mobile`; returns the transaction id.
    async fn generate_otp(&self, mobile: &MobileNumber) -> NotifierResult<String>;

    /// Exchange a transaction id and the OTP the user received for a session token.
    async fn confirm_otp(&self, txn_id: &str, otp: &Otp) -> NotifierResult<String>;

    async fn beneficiaries(&self, token: &str) -> NotifierResult<Vec<Beneficiary>>;
}

/// Map whose entries expire a fixed time after insertion.
///
/// Expired entries are invisible to readers and are dropped on the next write.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Remove and return a live entry.
    pub fn take(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.remove(key) {
            Some((value, expires)) if expires > now => Some(value),
            _ => None,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|(_, exp)| *exp > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_at(&self, key: K, value: V, now: Instant) {
        let mut entries = self.lock();
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key, (value, now + self.ttl));
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        self.lock()
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(value, _)| value.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, (V, Instant)>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Pending OTP transactions and verified tokens, both keyed by mobile number.
#[derive(Debug)]
pub struct OtpSessions {
    transactions: TtlCache<MobileNumber, String>,
    tokens: TtlCache<MobileNumber, String>,
}

impl OtpSessions {
    pub fn new(otp_ttl: Duration, token_ttl: Duration) -> Self {
        Self {
            transactions: TtlCache::new(otp_ttl),
            tokens: TtlCache::new(token_ttl),
        }
    }

    pub fn otp_ttl(&self) -> Duration {
        self.transactions.ttl()
    }

    pub fn begin(&self, mobile: MobileNumber, txn_id: String) {
        self.transactions.insert(mobile, txn_id);
    }

    pub fn pending(&self, mobile: &MobileNumber) -> Option<String> {
        self.transactions.get(mobile)
    }

    /// Record a verified token, closing the pending transaction.
    pub fn complete(&self, mobile: MobileNumber, token: String) {
        self.transactions.take(&mobile);
        self.tokens.insert(mobile, token);
    }

    pub fn token(&self, mobile: &MobileNumber) -> Option<String> {
        self.tokens.get(mobile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mobile() -> MobileNumber {
        MobileNumber::parse("9876543210").unwrap()
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let start = Instant::now();

        cache.insert_at("k", 1, start);
        assert_eq!(cache.get_at(&"k", start + Duration::from_secs(59)), Some(1));
        assert_eq!(cache.get_at(&"k", start + Duration::from_secs(60)), None);
    }

    #[test]
    fn writes_purge_expired_entries() {
        let cache = TtlCache::new(Duration::from_secs(10));
        let start = Instant::now();

        cache.insert_at("old", 1, start);
        cache.insert_at("new", 2, start + Duration::from_secs(11));
        assert_eq!(cache.lock().len(), 1);
        assert!(cache.lock().contains_key("new"));
    }

    #[test]
    fn take_removes_entry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k", "v");
        assert_eq!(cache.take(&"k"), Some("v"));
        assert_eq!(cache.take(&"k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn sessions_move_from_pending_to_verified() {
        let sessions = OtpSessions::new(Duration::from_secs(180), Duration::from_secs(900));
        sessions.begin(mobile(), "txn-1".into());
        assert_eq!(sessions.pending(&mobile()), Some("txn-1".into()));
        assert_eq!(sessions.token(&mobile()), None);

        sessions.complete(mobile(), "tok".into());
        assert_eq!(sessions.pending(&mobile()), None);
        assert_eq!(sessions.token(&mobile()), Some("tok".into()));
    }
}
