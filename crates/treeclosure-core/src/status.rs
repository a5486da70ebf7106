use crate::error::Result;
use crate::kv::KvStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const STATUS_KEY: &str = "treeclosure_scanner_status";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    NotStarted,
    Started,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub state: ScanState,
    pub root_path: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Persisted node count. Live while started, final once completed.
    pub total_scanned_items: i64,
}

impl ScanStatus {
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(finish)) => {
                Some((finish - start).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

/// Persists the scan lifecycle as JSON in a key-value store.
pub struct StatusTracker<'a> {
    kv: &'a dyn KvStore,
}

impl<'a> StatusTracker<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self { kv }
    }

    /// Stored status, or `NotStarted` when nothing readable is stored.
    pub fn load(&self) -> ScanStatus {
        let bytes = match self.kv.get(STATUS_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return ScanStatus::default(),
            Err(e) => {
                warn!("Failed to read scan status: {}", e);
                return ScanStatus::default();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("Discarding unreadable scan status: {}", e);
            ScanStatus::default()
        })
    }

    /// Stored status with the item count replaced by `live_count`.
    pub fn status_with_count(&self, live_count: i64) -> ScanStatus {
        let mut status = self.load();
        status.total_scanned_items = live_count;
        status
    }

    pub fn mark_started(&self, root_path: &str) -> Result<ScanStatus> {
        let status = ScanStatus {
            state: ScanState::Started,
            root_path: Some(root_path.to_string()),
            started_at: Some(Utc::now()),
            finished_at: None,
            total_scanned_items: 0,
        };
        self.save(&status)?;
        debug!("Scan status: started for {}", root_path);
        Ok(status)
    }

    pub fn mark_completed(&self, total_scanned_items: i64) -> Result<ScanStatus> {
        let current = self.load();
        let status = ScanStatus {
            state: ScanState::Completed,
            root_path: current.root_path,
            started_at: current.started_at,
            finished_at: Some(Utc::now()),
            total_scanned_items,
        };
        self.save(&status)?;
        debug!("Scan status: completed with {} items", total_scanned_items);
        Ok(status)
    }

    pub fn delete(&self) -> Result<()> {
        self.kv.delete(STATUS_KEY)
    }

    fn save(&self, status: &ScanStatus) -> Result<()> {
        let bytes = serde_json::to_vec(status)?;
        self.kv.set(STATUS_KEY, &bytes)
    }
}
