/// Lifecycle and progress events emitted by the chunked scanner.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A scan job was (re)started and its root item queued.
    Started { root_path: String },
    /// One chunk finished; `remaining` items are still queued.
    ChunkProcessed {
        processed: usize,
        persisted: usize,
        remaining: usize,
    },
    /// The queue drained, aggregates were recomputed and the status is final.
    Completed {
        total_items: i64,
        duration_secs: Option<f64>,
    },
}

/// Trait for receiving scan events.
///
/// The CLI implements this with an indicatif spinner; tests record events.
/// The default implementation ignores everything.
pub trait ProgressReporter: Send + Sync {
    fn on_event(&self, _event: &ScanEvent) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
