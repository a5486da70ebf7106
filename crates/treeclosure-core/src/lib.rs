pub mod analysis;
pub mod config;
pub mod error;
pub mod kv;
pub mod progress;
pub mod scanner;
pub mod scheduler;
pub mod status;
pub mod storage;
pub mod tree;

pub use config::{AppConfig, ScanSettings};
pub use error::{Error, Result};
pub use kv::{KvStore, MemoryKv};
pub use progress::{ProgressReporter, ScanEvent, SilentReporter};
pub use scanner::{ChunkReport, ChunkedScanner, LocalFs, ScanServices, StartOutcome};
pub use scheduler::{KvScheduler, Scheduler, PROCESS_CHUNK_HOOK};
pub use status::{ScanState, ScanStatus, StatusTracker};
pub use storage::{Database, TreeStore};
