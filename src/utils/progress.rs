use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Stations between log lines when no bar is drawn
pub const DEFAULT_LOG_INTERVAL: u64 = 100;

pub struct ProgressReporter {
    progress_bar: Option<ProgressBar>,
    total: u64,
    log_interval: u64,
    last_logged: AtomicU64,
}

impl ProgressReporter {
    /// A bar over `total` units; with `silent` nothing is drawn and progress goes to the log instead
    pub fn new(total: u64, message: &str, silent: bool) -> Self {
        let progress_bar = (!silent).then(|| {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            pb.set_style(style);
            pb.set_message(message.to_string());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        Self {
            progress_bar,
            total,
            log_interval: DEFAULT_LOG_INTERVAL,
            last_logged: AtomicU64::new(0),
        }
    }

    pub fn new_spinner(message: &str, silent: bool) -> Self {
        let progress_bar = (!silent).then(|| {
            let pb = ProgressBar::new_spinner();
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            pb.set_style(style);
            pb.set_message(message.to_string());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        Self {
            progress_bar,
            total: 0,
            log_interval: DEFAULT_LOG_INTERVAL,
            last_logged: AtomicU64::new(0),
        }
    }

    pub fn with_log_interval(mut self, interval: u64) -> Self {
        self.log_interval = interval.max(1);
        self
    }

    pub fn update(&self, current: u64) {
        match self.progress_bar {
            Some(ref pb) => pb.set_position(current),
            None => self.log_progress(current),
        }
    }

    fn log_progress(&self, current: u64) {
        let bucket = current / self.log_interval;
        if bucket == 0 {
            return;
        }
        let previous = self.last_logged.fetch_max(bucket, Ordering::Relaxed);
        if bucket > previous {
            info!("Processed {}/{} stations", current, self.total);
        }
    }

    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    pub fn finish_with_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish();
        }
    }
}
