use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A step announcement, e.g. "Download PETA dataset".
    Phase { message: String },
    Download { stats: DownloadStats },
    Extract { done: u64, total: u64 },
    Relocate { done: u64, total: u64 },
    /// Closes whatever download, extraction or relocation was in flight.
    Finished {
        message: String,
        elapsed: Option<Duration>,
    },
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn event(&self, _event: ProgressEvent) {}
}

pub fn phase(sink: &dyn ProgressSink, message: impl Into<String>) {
    let message = message.into();
    tracing::info!("{message}");
    sink.event(ProgressEvent::Phase { message });
}

/// Snapshot of a running download. `elapsed` is measured from an instant the
/// caller captured when the download started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadStats {
    pub downloaded: u64,
    pub total: Option<u64>,
    pub elapsed: Duration,
}

impl DownloadStats {
    pub fn new(downloaded: u64, total: Option<u64>, elapsed: Duration) -> Self {
        Self {
            downloaded,
            total: total.filter(|total| *total > 0),
            elapsed,
        }
    }

    pub fn percent(&self) -> Option<u64> {
        self.total
            .map(|total| (self.downloaded.saturating_mul(100) / total).min(100))
    }

    pub fn megabytes(&self) -> u64 {
        self.downloaded / (1024 * 1024)
    }

    pub fn kilobytes_per_second(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64() + 1e-6;
        (self.downloaded as f64 / (1024.0 * secs)) as u64
    }

    pub fn render(&self) -> String {
        let tail = format!(
            "{} MB, {} KB/s, {} seconds passed",
            self.megabytes(),
            self.kilobytes_per_second(),
            self.elapsed.as_secs()
        );
        match self.percent() {
            Some(percent) => format!("...{percent}%, {tail}"),
            None => format!("...{tail}"),
        }
    }
}
