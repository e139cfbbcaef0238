//! Shared identifiers, error types, and runtime configuration for the
//! storage core.

#[cfg(test)]
mod tests;

use std::{io, path::PathBuf};

use dbtypes::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a page across memory and disk: a tablespace name plus a page
/// number within that tablespace's container file.
///
/// # Examples
/// - `PageId::new("SYSTEM", 0)` — the container metadata page of `SYSTEM`.
/// - `PageId::new("T1", 2)` — the first user page ever allocated in `T1`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    pub tablespace: String,
    pub page_number: u64,
}

impl PageId {
    pub fn new(tablespace: impl Into<String>, page_number: u64) -> Self {
        Self {
            tablespace: tablespace.into(),
            page_number,
        }
    }
}

/// Fully-qualified identifier for a row within a chained table-data page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

/// A self-describing, ordered key-value row. Stored verbatim (as an encoded
/// byte blob) in slotted table-data pages, so both user tables and the
/// `SYS_*` catalog tables share the same on-disk row representation.
///
/// # Examples
/// - `Row::new(vec![("id".into(), Value::Integer(1))])`
/// - `Row::new(vec![("name".into(), Value::Varchar("alice".into())), ("active".into(), Value::Boolean(true))])`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row(pub Vec<(String, Value)>);

impl Row {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self(fields)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    /// Encode the row as a self-describing byte blob for slotted-page storage.
    pub fn encode(&self) -> DbResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DbError::Storage(format!("encode row failed: {e}")))
    }

    /// Decode a row previously produced by [`Row::encode`].
    pub fn decode(bytes: &[u8]) -> DbResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| DbError::Storage(format!("decode row failed: {e}")))
    }
}

/// Canonical error type shared across the storage core.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("page {page_number} belongs to tablespace '{actual}', not '{expected}'")]
    WrongTablespace {
        expected: String,
        actual: String,
        page_number: u64,
    },
    #[error("page {requested} out of range (total_pages = {total})")]
    PageOutOfRange { requested: u64, total: u64 },
    #[error("container corrupt: {0}")]
    ContainerCorrupt(String),
    #[error("allocation failed: no free pages available in tablespace '{0}'")]
    AllocationFailed(String),
    #[error("row of {needed} bytes does not fit on a {page_size}-byte page")]
    PageTooSmall { needed: usize, page_size: usize },
    #[error("pin leak: page {page:?} held {pin_count} pin(s) at shutdown")]
    PinLeak { page: PageId, pin_count: u32 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a [`DbError`].
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage core.
///
/// # Example
/// ```
/// use dbcommon::StorageConfig;
/// use std::path::PathBuf;
///
/// let config = StorageConfig::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(8192)
///     .buffer_pool_pages(512)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct StorageConfig {
    /// Directory where tablespace container files live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed-size page allocation in bytes, identical for every page in a
    /// container.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Number of pages a single tablespace's buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
    /// Whether the background page cleaner runs at all.
    #[builder(default = true)]
    pub cleaner_enabled: bool,
    /// Sleep interval between dirty-page checks, in milliseconds.
    #[builder(default = 5000)]
    pub cleaner_interval_ms: u64,
    /// Dirty-page count that triggers a cleaner flush.
    #[builder(default = 10)]
    pub cleaner_dirty_threshold: usize,
    /// Enables the debug-only pin tracker (see `dbbuffer::PinTracker`).
    #[builder(default = false)]
    pub pin_tracking_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 4096,
            buffer_pool_pages: 256,
            cleaner_enabled: true,
            cleaner_interval_ms: 5000,
            cleaner_dirty_threshold: 10,
            pin_tracking_enabled: false,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{DbError, DbResult, PageId, RecordId, Row, StorageConfig};
    pub use dbtypes::{SqlType, Value};
}
