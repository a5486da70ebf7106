use crate::error::Result;
use crate::kv::KvStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Hook that drives chunk continuations.
pub const PROCESS_CHUNK_HOOK: &str = "treeclosure_process_scan_chunk";

const SCHEDULE_KEY: &str = "treeclosure_schedule";

/// Single-shot continuation registry. Whoever runs the registry fires due
/// hooks by calling the matching scanner operation.
pub trait Scheduler {
    /// Registers `hook` to fire after `delay`, replacing any pending entry.
    fn schedule(&self, hook: &str, delay: Duration) -> Result<()>;
    fn unschedule(&self, hook: &str) -> Result<()>;
    fn is_scheduled(&self, hook: &str) -> Result<bool>;
}

/// Scheduler whose registry is a JSON map of hook → due time kept in a
/// key-value store, so continuations survive process restarts.
pub struct KvScheduler<'a> {
    kv: &'a dyn KvStore,
}

impl<'a> KvScheduler<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self { kv }
    }

    fn load(&self) -> Result<BTreeMap<String, DateTime<Utc>>> {
        match self.kv.get(SCHEDULE_KEY)? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    warn!("Discarding unreadable schedule registry: {}", e);
                    Ok(BTreeMap::new())
                }
            },
            None => Ok(BTreeMap::new()),
        }
    }

    fn store(&self, entries: &BTreeMap<String, DateTime<Utc>>) -> Result<()> {
        if entries.is_empty() {
            return self.kv.delete(SCHEDULE_KEY);
        }
        let bytes = serde_json::to_vec(entries)?;
        self.kv.set(SCHEDULE_KEY, &bytes)
    }

    pub fn next_due(&self, hook: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.load()?.get(hook).copied())
    }

    /// Removes `hook` and returns true if it was due at `now`.
    pub fn take_due(&self, hook: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut entries = self.load()?;
        match entries.get(hook) {
            Some(due) if *due <= now => {
                entries.remove(hook);
                self.store(&entries)?;
                debug!("Firing hook '{}'", hook);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Scheduler for KvScheduler<'_> {
    fn schedule(&self, hook: &str, delay: Duration) -> Result<()> {
        let delay = ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::zero());
        let due = Utc::now() + delay;
        let mut entries = self.load()?;
        entries.insert(hook.to_string(), due);
        self.store(&entries)?;
        debug!("Scheduled hook '{}' at {}", hook, due.to_rfc3339());
        Ok(())
    }

    fn unschedule(&self, hook: &str) -> Result<()> {
        let mut entries = self.load()?;
        if entries.remove(hook).is_some() {
            self.store(&entries)?;
            debug!("Unscheduled hook '{}'", hook);
        }
        Ok(())
    }

    fn is_scheduled(&self, hook: &str) -> Result<bool> {
        Ok(self.load()?.contains_key(hook))
    }
}
