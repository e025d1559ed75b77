//! JSON-file persistence for listings awaiting evaluation and their results.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, info};

use crate::domain::{EvaluationResult, Isbn, Listing};

const STORE_DIR: &str = "bookflip-evaluator";
const STORE_FILENAME: &str = "listings.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error("no stored listing for identifier {0}")]
    UnknownListing(Isbn),
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Where listings come from and where results go.
pub trait ListingStore {
    /// Listings without an evaluation, oldest first.
    fn pending_listings(&self) -> Result<Vec<Listing>, StoreError>;

    fn record_evaluation(
        &mut self,
        result: &EvaluationResult,
        evaluated_at: OffsetDateTime,
    ) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub listing: Listing,
    #[serde(default)]
    pub evaluation: Option<EvaluationRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub result: EvaluationResult,
    /// RFC 3339 completion time.
    pub evaluated_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    records: Vec<ListingRecord>,
}

pub struct JsonFileStore {
    path: PathBuf,
    records: Vec<ListingRecord>,
}

impl JsonFileStore {
    /// Opens the store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "no listing store yet; starting empty");
            return Ok(Self {
                path,
                records: Vec::new(),
            });
        }

        let content = fs::read_to_string(&path)?;
        let file: StoreFile = serde_json::from_str(&content)?;
        info!(
            path = %path.display(),
            records = file.records.len(),
            "loaded listing store"
        );
        Ok(Self {
            path,
            records: file.records,
        })
    }

    /// Opens `listings.json` under the platform's local data directory.
    pub fn open_default() -> Result<Self, StoreError> {
        let base = dirs::data_local_dir().ok_or(StoreError::StorageUnavailable)?;
        Self::open(base.join(STORE_DIR).join(STORE_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds a listing unless one with the same identifier (in either form)
    /// is already stored. Returns whether it was added.
    pub fn insert_listing(&mut self, listing: Listing) -> Result<bool, StoreError> {
        if self.position(&listing.identifier).is_some() {
            debug!(identifier = %listing.identifier, "duplicate listing ignored");
            return Ok(false);
        }
        let mut records = self.records.clone();
        records.push(ListingRecord {
            listing,
            evaluation: None,
        });
        self.commit(records)?;
        Ok(true)
    }

    pub fn evaluation(&self, identifier: &Isbn) -> Option<&EvaluationRecord> {
        self.position(identifier)
            .and_then(|index| self.records[index].evaluation.as_ref())
    }

    pub fn records(&self) -> &[ListingRecord] {
        &self.records
    }

    fn position(&self, identifier: &Isbn) -> Option<usize> {
        let key = identifier.to_isbn13();
        self.records
            .iter()
            .position(|record| record.listing.identifier.to_isbn13() == key)
    }

    /// Writes `records` to disk and only then replaces the in-memory set,
    /// so a failed write leaves the store as it was.
    fn commit(&mut self, records: Vec<ListingRecord>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = StoreFile { records };
        let content = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, content)?;
        debug!(
            path = %self.path.display(),
            records = file.records.len(),
            "saved listing store"
        );
        self.records = file.records;
        Ok(())
    }
}

impl ListingStore for JsonFileStore {
    fn pending_listings(&self) -> Result<Vec<Listing>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|record| record.evaluation.is_none())
            .map(|record| record.listing.clone())
            .collect())
    }

    fn record_evaluation(
        &mut self,
        result: &EvaluationResult,
        evaluated_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let index = self
            .position(&result.identifier)
            .ok_or_else(|| StoreError::UnknownListing(result.identifier.clone()))?;
        let mut records = self.records.clone();
        records[index].evaluation = Some(EvaluationRecord {
            result: result.clone(),
            evaluated_at: evaluated_at.format(&Rfc3339)?,
        });
        self.commit(records)
    }
}
