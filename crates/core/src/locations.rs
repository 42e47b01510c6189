//! District keyword index.
//!
//! The index is built once at startup from a district file and is read-only afterwards, so it
//! can be shared behind an `Arc` by the scheduler and the interactive handler.
//!
//! ## File format
//!
//! The district file uses the same shape as the availability API's
//! `admin/location/districts/{state_id}` response, so a fetched response can be concatenated
//! into it directly:
//!
//! ```json
//! { "districts": [ { "district_id": 363, "district_name": "Pune" } ] }
//! ```
//!
//! Entry order matters: lookups return the *first* district whose lower-cased name contains the
//! query, in file order.

use crate::{NotifierError, NotifierResult};
use notifier_types::DistrictId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One district as published by the availability API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrictEntry {
    pub district_id: DistrictId,
    pub district_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DistrictsDocument {
    #[serde(default)]
    pub(crate) districts: Vec<DistrictEntry>,
}

/// Immutable keyword → district table.
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    entries: Vec<(String, DistrictId)>,
}

impl LocationIndex {
    /// Build an index from `(name, id)` pairs.
    ///
    /// Names are lower-cased and trimmed. When two entries share a name, the first one wins.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, DistrictId)>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for (name, id) in entries {
            let key = name.as_ref().trim().to_lowercase();
            if key.is_empty() || index.entries.iter().any(|(k, _)| *k == key) {
                continue;
            }
            index.entries.push((key, id));
        }
        index
    }

    /// Load the index from a district file.
    ///
    /// # Errors
    ///
    /// Returns `NotifierError::LocationIndexLoad` if the file cannot be read, is not valid JSON
    /// in the expected shape, or contains no districts. Callers treat this as fatal.
    pub fn load(path: &Path) -> NotifierResult<Self> {
        let load_error = |reason: String| NotifierError::LocationIndexLoad {
            path: path.to_path_buf(),
            reason,
        };

        let contents = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let index = Self::from_json(&contents).map_err(|e| load_error(e.to_string()))?;
        if index.is_empty() {
            return Err(load_error("index contains no districts".into()));
        }

        tracing::info!(
            districts = index.len(),
            path = %path.display(),
            "loaded location index"
        );
        Ok(index)
    }

    /// Parse the district file contents.
    pub fn from_json(contents: &str) -> NotifierResult<Self> {
        let document: DistrictsDocument =
            serde_json::from_str(contents).map_err(NotifierError::Deserialization)?;
        Ok(Self::from_entries(
            document
                .districts
                .into_iter()
                .map(|d| (d.district_name, d.district_id)),
        ))
    }

    /// First district whose key contains `keyword`, in insertion order.
    ///
    /// `keyword` is lower-cased and trimmed first; an empty keyword never matches.
    pub fn lookup(&self, keyword: &str) -> Option<(&str, DistrictId)> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(key, _)| key.contains(&needle))
            .map(|(key, id)| (key.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DistrictId)> {
        self.entries.iter().map(|(k, id)| (k.as_str(), *id))
    }
}

/// Write a district file that [`LocationIndex::load`] can read back.
pub fn write_district_file(path: &Path, districts: Vec<DistrictEntry>) -> NotifierResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(NotifierError::StorageDirCreation)?;
    }

    let json = serde_json::to_string_pretty(&DistrictsDocument { districts })
        .map_err(NotifierError::Serialization)?;
    fs::write(path, json).map_err(NotifierError::FileWrite)
}
