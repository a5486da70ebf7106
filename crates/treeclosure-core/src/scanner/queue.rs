use super::item::{AncestorRecord, ItemHandle, QueueItem};
use crate::error::Result;
use crate::kv::KvStore;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

pub const QUEUE_SNAPSHOT_KEY: &str = "treeclosure_scan_queue";

/// Everything a scan needs to resume: the pending items and the arena of
/// ancestor records their handles point into.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct QueueSnapshot {
    ancestors: Vec<AncestorRecord>,
    items: VecDeque<QueueItem>,
}

impl QueueSnapshot {
    /// Drops ancestor records no pending item refers to and renumbers the rest.
    fn compact(&mut self) {
        let mut live = vec![false; self.ancestors.len()];
        for item in &self.items {
            for handle in item.ancestors.iter().chain(item.parent.iter()) {
                if let Some(slot) = live.get_mut(handle.index()) {
                    *slot = true;
                }
            }
        }

        if live.iter().all(|&l| l) {
            return;
        }

        let mut remap: Vec<Option<u32>> = vec![None; self.ancestors.len()];
        let mut kept = Vec::with_capacity(live.iter().filter(|&&l| l).count());
        for (index, record) in self.ancestors.drain(..).enumerate() {
            if live[index] {
                remap[index] = Some(kept.len() as u32);
                kept.push(record);
            }
        }
        let dropped = remap.len() - kept.len();
        self.ancestors = kept;

        let translate = |handle: ItemHandle| remap.get(handle.index()).copied().flatten().map(ItemHandle);
        for item in self.items.iter_mut() {
            item.parent = item.parent.and_then(translate);
            item.ancestors = item.ancestors.iter().copied().filter_map(translate).collect();
        }
        trace!("Compacted queue arena, dropped {} ancestor records", dropped);
    }
}

/// Checkpointable FIFO of scan items.
///
/// The whole queue is serialized with bincode into one blob under
/// [`QUEUE_SNAPSHOT_KEY`], so a chunk loads it once and saves it once.
pub struct ScanQueue<'a> {
    kv: &'a dyn KvStore,
    state: QueueSnapshot,
}

impl<'a> ScanQueue<'a> {
    /// Starts empty; call [`ScanQueue::load_state`] to pick up a snapshot.
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self {
            kv,
            state: QueueSnapshot::default(),
        }
    }

    pub fn enqueue(&mut self, item: QueueItem) {
        self.state.items.push_back(item);
    }

    pub fn dequeue(&mut self) -> Option<QueueItem> {
        self.state.items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.state.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.items.len()
    }

    /// Adds a persisted directory to the arena so its children can point at it.
    pub fn register_ancestor(&mut self, item: &QueueItem) -> ItemHandle {
        let handle = ItemHandle(self.state.ancestors.len() as u32);
        self.state.ancestors.push(item.to_ancestor_record());
        handle
    }

    pub fn ancestor(&self, handle: ItemHandle) -> Option<&AncestorRecord> {
        self.state.ancestors.get(handle.index())
    }

    pub fn ancestor_count(&self) -> usize {
        self.state.ancestors.len()
    }

    /// Writes the whole queue as one snapshot, replacing the previous one.
    pub fn save_state(&mut self) -> Result<()> {
        self.state.compact();
        let bytes = bincode::serialize(&self.state)?;
        self.kv.set(QUEUE_SNAPSHOT_KEY, &bytes)?;
        debug!(
            "Saved queue snapshot: {} items, {} ancestors, {} bytes",
            self.state.items.len(),
            self.state.ancestors.len(),
            bytes.len()
        );
        Ok(())
    }

    /// Replaces the in-memory queue with the stored snapshot. A missing or
    /// undecodable snapshot yields an empty queue.
    pub fn load_state(&mut self) {
        self.state = match self.kv.get(QUEUE_SNAPSHOT_KEY) {
            Ok(Some(bytes)) => match bincode::deserialize::<QueueSnapshot>(&bytes) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Queue snapshot did not decode, starting empty: {}", e);
                    QueueSnapshot::default()
                }
            },
            Ok(None) => QueueSnapshot::default(),
            Err(e) => {
                warn!("Failed to read queue snapshot, starting empty: {}", e);
                QueueSnapshot::default()
            }
        };
        debug!("Loaded queue snapshot with {} items", self.state.items.len());
    }

    /// Clears the queue and persists the empty state right away.
    pub fn reset_state(&mut self) -> Result<()> {
        self.state = QueueSnapshot::default();
        self.save_state()
    }

    /// Clears the queue and removes the snapshot key.
    pub fn delete_state(&mut self) -> Result<()> {
        self.state = QueueSnapshot::default();
        self.kv.delete(QUEUE_SNAPSHOT_KEY)
    }
}
