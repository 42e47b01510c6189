//! Subscriber records and their storage.
//!
//! The core talks to storage only through [`SubscriberStore`]. Two implementations are provided:
//!
//! - [`InMemorySubscriberStore`] for tests and throwaway runs
//! - [`FileSubscriberStore`], which keeps the whole table in memory and rewrites a YAML file
//!   after every mutation
//!
//! Both serialise access behind a `tokio::sync::RwLock`, which gives per-key atomic CRUD; the
//! scheduler and the interactive path never coordinate beyond that.

use crate::intent::AgeTier;
use crate::{NotifierError, NotifierResult};
use async_trait::async_trait;
use notifier_types::{DistrictId, Pincode, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Where a subscriber wants to be notified about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationPreference {
    Pincode { pincode: Pincode },
    District { id: DistrictId, name: String },
}

impl LocationPreference {
    /// Human-readable label used in replies and report titles.
    pub fn label(&self) -> String {
        match self {
            LocationPreference::Pincode { pincode } => pincode.to_string(),
            LocationPreference::District { name, .. } => title_case(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub user_id: UserId,
    pub preference: LocationPreference,
    #[serde(default)]
    pub age_tier: AgeTier,
}

/// Key-value repository of subscribers, keyed by user id.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn get(&self, user_id: &UserId) -> NotifierResult<Option<Subscriber>>;

    /// Insert or replace the record for `subscriber.user_id`.
    async fn upsert(&self, subscriber: Subscriber) -> NotifierResult<()>;

    /// # Errors
    ///
    /// Returns `NotifierError::SubscriberNotFound` if there is no record for `user_id`.
    async fn delete(&self, user_id: &UserId) -> NotifierResult<()>;

    /// Snapshot of every record, ordered by user id.
    async fn list_all(&self) -> NotifierResult<Vec<Subscriber>>;
}

#[derive(Debug, Default)]
pub struct InMemorySubscriberStore {
    records: RwLock<BTreeMap<UserId, Subscriber>>,
}

impl InMemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriberStore for InMemorySubscriberStore {
    async fn get(&self, user_id: &UserId) -> NotifierResult<Option<Subscriber>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, subscriber: Subscriber) -> NotifierResult<()> {
        self.records
            .write()
            .await
            .insert(subscriber.user_id.clone(), subscriber);
        Ok(())
    }

    async fn delete(&self, user_id: &UserId) -> NotifierResult<()> {
        self.records
            .write()
            .await
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| NotifierError::SubscriberNotFound(user_id.to_string()))
    }

    async fn list_all(&self) -> NotifierResult<Vec<Subscriber>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscribersDocument {
    #[serde(default)]
    subscribers: Vec<Subscriber>,
}

/// YAML-file backed store.
///
/// The file is read once in [`FileSubscriberStore::open`]; afterwards the in-memory table is
/// authoritative and the file is rewritten (via a temporary file and rename) on every change.
#[derive(Debug)]
pub struct FileSubscriberStore {
    path: PathBuf,
    records: RwLock<BTreeMap<UserId, Subscriber>>,
}

impl FileSubscriberStore {
    /// Open the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns `FileRead` or `YamlDeserialization` if an existing file cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> NotifierResult<Self> {
        let path = path.into();
        let records = if path.is_file() {
            let contents = fs::read_to_string(&path).map_err(NotifierError::FileRead)?;
            let document: SubscribersDocument = if contents.trim().is_empty() {
                SubscribersDocument::default()
            } else {
                serde_yaml::from_str(&contents).map_err(NotifierError::YamlDeserialization)?
            };
            document
                .subscribers
                .into_iter()
                .map(|s| (s.user_id.clone(), s))
                .collect()
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), subscribers = records.len(), "opened subscriber store");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialise `records` and write them to disk on the blocking pool.
    ///
    /// Callers hold the write guard across this call so concurrent mutations land in order.
    async fn persist(&self, records: &BTreeMap<UserId, Subscriber>) -> NotifierResult<()> {
        let document = SubscribersDocument {
            subscribers: records.values().cloned().collect(),
        };
        let yaml = serde_yaml::to_string(&document).map_err(NotifierError::YamlSerialization)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &yaml))
            .await
            .map_err(|e| NotifierError::FileWrite(std::io::Error::other(e)))?
    }
}

/// Write `contents` next to `path` and rename it into place.
fn write_atomically(path: &Path, contents: &str) -> NotifierResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(NotifierError::StorageDirCreation)?;
    }
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, contents).map_err(NotifierError::FileWrite)?;
    fs::rename(&tmp, path).map_err(NotifierError::FileWrite)
}

#[async_trait]
impl SubscriberStore for FileSubscriberStore {
    async fn get(&self, user_id: &UserId) -> NotifierResult<Option<Subscriber>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, subscriber: Subscriber) -> NotifierResult<()> {
        let mut records = self.records.write().await;
        let previous = records.insert(subscriber.user_id.clone(), subscriber.clone());

        if let Err(e) = self.persist(&records).await {
            // Keep memory and disk in step.
            match previous {
                Some(old) => records.insert(old.user_id.clone(), old),
                None => records.remove(&subscriber.user_id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, user_id: &UserId) -> NotifierResult<()> {
        let mut records = self.records.write().await;
        let removed = records
            .remove(user_id)
            .ok_or_else(|| NotifierError::SubscriberNotFound(user_id.to_string()))?;

        if let Err(e) = self.persist(&records).await {
            records.insert(removed.user_id.clone(), removed);
            return Err(e);
        }
        Ok(())
    }

    async fn list_all(&self) -> NotifierResult<Vec<Subscriber>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
