use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use treeclosure_core::{ProgressReporter, ScanEvent};

/// Spinner that follows a scan across chunks.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
    persisted: AtomicUsize,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            persisted: AtomicUsize::new(0),
        }
    }

    fn spinner(message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_event(&self, event: &ScanEvent) {
        match event {
            ScanEvent::Started { root_path } => {
                self.persisted.store(0, Ordering::Relaxed);
                self.set_bar(Self::spinner(format!("Scanning {}...", root_path)));
            }
            ScanEvent::ChunkProcessed {
                persisted,
                remaining,
                ..
            } => {
                let total = self.persisted.fetch_add(*persisted, Ordering::Relaxed) + persisted;
                if let Ok(guard) = self.bar.lock() {
                    if let Some(pb) = guard.as_ref() {
                        pb.set_message(format!(
                            "Scanning... {} items persisted, {} queued",
                            total, remaining
                        ));
                    }
                }
            }
            ScanEvent::Completed {
                total_items,
                duration_secs,
            } => {
                self.finish_bar();
                eprintln!(
                    "  \x1b[32m✓\x1b[0m Scan complete: {} items in {:.2}s",
                    total_items,
                    duration_secs.unwrap_or_default()
                );
            }
        }
    }
}
