pub mod chunked;
pub mod fs;
pub mod item;
pub mod queue;

pub use chunked::{ChunkReport, ChunkedScanner, ScanServices, StartOutcome};
pub use fs::{ChildEntry, FileSystem, LocalFs};
pub use item::{AncestorRecord, ItemHandle, QueueItem};
pub use queue::{ScanQueue, QUEUE_SNAPSHOT_KEY};
