use super::fs::FileSystem;
use super::item::QueueItem;
use super::queue::ScanQueue;
use crate::config::ScanSettings;
use crate::error::Result;
use crate::kv::KvStore;
use crate::progress::{ProgressReporter, ScanEvent};
use crate::scheduler::{Scheduler, PROCESS_CHUNK_HOOK};
use crate::status::{ScanState, ScanStatus, StatusTracker};
use crate::storage::models::{ClosureLink, NewNode};
use crate::storage::TreeStore;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Collaborators a scanner is wired to. All are borrowed for the scanner's
/// lifetime; the queue snapshot and the status may share one store.
pub struct ScanServices<'a> {
    pub store: &'a dyn TreeStore,
    pub fs: &'a dyn FileSystem,
    pub queue_kv: &'a dyn KvStore,
    pub status_kv: &'a dyn KvStore,
    pub scheduler: &'a dyn Scheduler,
    pub reporter: &'a dyn ProgressReporter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The root is not an existing directory; nothing was touched.
    InvalidRoot,
}

/// What one `process_chunk` call did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    /// Items taken off the queue. This is the figure bounded by the chunk size.
    pub dequeued: usize,
    pub persisted: usize,
    pub retried: usize,
    pub dropped: usize,
    pub skipped_unreadable: usize,
    pub enqueued: usize,
    pub remaining: usize,
    pub finalized: bool,
}

/// Drives a scan in bounded chunks, one scheduler invocation at a time.
///
/// Each chunk loads the queue snapshot, processes up to `chunk_size` items in
/// order, saves the snapshot and schedules the next chunk. The chunk that
/// finds the queue empty aggregates directory totals and completes the scan.
/// Callers must not run two chunks of the same scan at once.
pub struct ChunkedScanner<'a> {
    store: &'a dyn TreeStore,
    fs: &'a dyn FileSystem,
    scheduler: &'a dyn Scheduler,
    reporter: &'a dyn ProgressReporter,
    queue: ScanQueue<'a>,
    status: StatusTracker<'a>,
    settings: ScanSettings,
}

impl<'a> ChunkedScanner<'a> {
    pub fn new(services: ScanServices<'a>, settings: ScanSettings) -> Self {
        Self {
            store: services.store,
            fs: services.fs,
            scheduler: services.scheduler,
            reporter: services.reporter,
            queue: ScanQueue::new(services.queue_kv),
            status: StatusTracker::new(services.status_kv),
            settings: settings.normalized(),
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Status with the live number of persisted nodes.
    pub fn status(&self) -> Result<ScanStatus> {
        Ok(self.status.status_with_count(self.store.count_nodes()?))
    }

    /// Number of items in the stored queue snapshot.
    pub fn pending_items(&mut self) -> usize {
        self.queue.load_state();
        self.queue.len()
    }

    /// Wipes previous results and queues `root_path` as the only item.
    ///
    /// Restarting a running scan is allowed and discards its progress. A root
    /// that is not a directory is a silent no-op. If the wipe fails nothing is
    /// queued or scheduled and the error is returned.
    pub fn start_scan_job(&mut self, root_path: &Path) -> Result<StartOutcome> {
        if !self.fs.is_dir(root_path) {
            debug!("Not starting scan: {} is not a directory", root_path.display());
            return Ok(StartOutcome::InvalidRoot);
        }
        let root_entry = match self.fs.stat(root_path) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Not starting scan: cannot stat {}: {}", root_path.display(), e);
                return Ok(StartOutcome::InvalidRoot);
            }
        };

        if let Err(e) = self.store.truncate_tree() {
            error!("Failed to wipe tree tables, scan not started: {}", e);
            return Err(e);
        }

        self.queue.reset_state()?;
        self.queue
            .enqueue(QueueItem::root(&root_entry, self.settings.retry_budget));
        self.queue.save_state()?;

        if !self.scheduler.is_scheduled(PROCESS_CHUNK_HOOK)? {
            self.scheduler
                .schedule(PROCESS_CHUNK_HOOK, self.settings.chunk_delay)?;
        }

        let root = root_entry.path.to_string_lossy().into_owned();
        self.status.mark_started(&root)?;
        info!("Scan started at {}", root);
        self.reporter.on_event(&ScanEvent::Started { root_path: root });
        Ok(StartOutcome::Started)
    }

    /// Processes one chunk. Every dequeued item counts toward the chunk size,
    /// including items dropped for an exhausted retry budget.
    ///
    /// The next chunk is scheduled even when this one drains the queue: that
    /// invocation finds the queue empty and finalizes the scan.
    pub fn process_chunk(&mut self) -> Result<ChunkReport> {
        let start = Instant::now();
        let mut report = ChunkReport::default();
        self.queue.load_state();

        if self.queue.is_empty() {
            if self.status.load().state == ScanState::Started {
                if let Err(e) = self.finalize_scan() {
                    error!("Failed to finalize scan, will retry: {}", e);
                    self.scheduler
                        .schedule(PROCESS_CHUNK_HOOK, self.settings.chunk_delay)?;
                    return Err(e);
                }
                report.finalized = true;
            } else {
                debug!("No scan in progress, nothing to process");
            }
            return Ok(report);
        }

        while report.dequeued < self.settings.chunk_size {
            let Some(item) = self.queue.dequeue() else {
                break;
            };
            report.dequeued += 1;

            if !item.has_retries() {
                warn!("Dropping {}: retry budget exhausted", item.path);
                report.dropped += 1;
                continue;
            }

            if item.is_dir() {
                self.process_directory(item, &mut report);
            } else {
                self.process_file(item, &mut report);
            }
        }

        report.remaining = self.queue.len();
        self.queue.save_state()?;
        // Also scheduled once the queue is empty: that next chunk finalizes.
        self.scheduler
            .schedule(PROCESS_CHUNK_HOOK, self.settings.chunk_delay)?;

        debug!(
            "Chunk processed in {:.2}s: {} dequeued, {} persisted, {} retried, {} dropped, {} remaining",
            start.elapsed().as_secs_f64(),
            report.dequeued,
            report.persisted,
            report.retried,
            report.dropped,
            report.remaining,
        );
        self.reporter.on_event(&ScanEvent::ChunkProcessed {
            processed: report.dequeued,
            persisted: report.persisted,
            remaining: report.remaining,
        });
        Ok(report)
    }

    fn process_directory(&mut self, mut item: QueueItem, report: &mut ChunkReport) {
        let Some(node_id) = self.insert_node(&item) else {
            // No id means children would have no parent row to hang below.
            self.requeue_failed(item, report);
            return;
        };
        item.record_id = Some(node_id);
        report.persisted += 1;

        let children = match self.fs.list_children(Path::new(&item.path)) {
            Ok(children) => children,
            Err(e) => {
                warn!("Failed to list children of {}: {}", item.path, e);
                return;
            }
        };
        if children.is_empty() {
            return;
        }

        let handle = self.queue.register_ancestor(&item);
        for child in children {
            if !child.readable {
                warn!("Skipping unreadable entry: {}", child.path.display());
                report.skipped_unreadable += 1;
                continue;
            }
            self.queue.enqueue(QueueItem::child_of(
                &item,
                handle,
                child,
                self.settings.retry_budget,
            ));
            report.enqueued += 1;
        }
    }

    fn process_file(&mut self, item: QueueItem, report: &mut ChunkReport) {
        match self.insert_node(&item) {
            Some(_) => report.persisted += 1,
            None => self.requeue_failed(item, report),
        }
    }

    fn requeue_failed(&mut self, mut item: QueueItem, report: &mut ChunkReport) {
        item.decrement_retry();
        if item.has_retries() {
            warn!(
                "({}) Retrying {}: {}",
                item.retry_budget, item.node_type, item.path
            );
            report.retried += 1;
            self.queue.enqueue(item);
        } else {
            error!(
                "Giving up on {} {} after repeated insert failures",
                item.node_type, item.path
            );
            if item.is_dir() {
                warn!("Subtree of {} will be missing from this scan", item.path);
            }
            report.dropped += 1;
        }
    }

    /// Persists the node and its closure rows. Failures are logged and come
    /// back as `None`.
    fn insert_node(&self, item: &QueueItem) -> Option<i64> {
        let parent_id = item
            .parent
            .and_then(|handle| self.queue.ancestor(handle))
            .and_then(|ancestor| ancestor.record_id);

        let mut links = Vec::with_capacity(item.ancestors.len());
        for handle in &item.ancestors {
            match self.queue.ancestor(*handle) {
                Some(ancestor) => match ancestor.record_id {
                    Some(ancestor_id) => links.push(ClosureLink {
                        ancestor_id,
                        depth: item.depth_relative_to(ancestor.depth),
                    }),
                    None => debug!(
                        "Ancestor {} of {} has no record, skipping closure row",
                        ancestor.path, item.path
                    ),
                },
                None => debug!("Dangling ancestor handle for {}", item.path),
            }
        }

        let node = NewNode {
            path: &item.path,
            name: &item.name,
            node_type: item.node_type,
            size: item.provisional_size(),
            last_modified: item.last_modified,
            parent_id,
        };

        match self.store.insert_node(&node, &links) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Insert node failed for {}: {}", item.path, e);
                None
            }
        }
    }

    /// The queue and the continuation are only cleared once the status is
    /// final, so a failure here leaves the scan `Started` and retryable.
    fn finalize_scan(&mut self) -> Result<()> {
        // Stale totals are preferable to a scan that never completes.
        match self.store.recompute_aggregates() {
            Ok(report) => debug!(
                "Aggregation pass: {} directories updated, {} empty, {} failed",
                report.directories_updated, report.emptied_directories, report.failed_updates
            ),
            Err(e) => error!("Aggregation failed, directory totals may be stale: {}", e),
        }

        let total_items = self.store.count_nodes()?;
        let status = self.status.mark_completed(total_items)?;

        self.queue.reset_state()?;
        self.queue.delete_state()?;
        self.scheduler.unschedule(PROCESS_CHUNK_HOOK)?;

        info!("Scan complete: {} items persisted", total_items);
        self.reporter.on_event(&ScanEvent::Completed {
            total_items,
            duration_secs: status.duration_secs(),
        });
        Ok(())
    }
}
