use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::fmt::MakeWriter;

use crate::app::{PrepareReport, StepStatus};
use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &PrepareReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_report(report: &PrepareReport) -> io::Result<()> {
        let mut stderr = io::stderr();
        writeln!(stderr, "Dataset root: {}", report.root)?;
        for outcome in &report.steps {
            let status = match outcome.status {
                StepStatus::Completed => "done",
                StepStatus::Failed => "FAILED",
                StepStatus::NotRun => "not run",
            };
            write!(stderr, "  {:<12} {:<8}", outcome.step.to_string(), status)?;
            if let Some(summary) = &outcome.summary {
                write!(stderr, " {} files extracted", summary.extracted)?;
                if summary.extract_failures > 0 {
                    write!(stderr, ", {} entries skipped", summary.extract_failures)?;
                }
                if summary.relocated > 0 {
                    write!(stderr, ", {} relocated", summary.relocated)?;
                }
            }
            if let Some(failure) = &outcome.failure {
                write!(stderr, " {}", failure.message)?;
            }
            writeln!(stderr)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BarKind {
    Download,
    Extract,
    Relocate,
}

const COUNTED_TEMPLATE: &str = "{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

type ActiveBar = Arc<Mutex<Option<(BarKind, ProgressBar)>>>;

/// Terminal progress on stderr: a status line for downloads and counted bars
/// for extraction and relocation.
#[derive(Default)]
pub struct ConsoleProgress {
    current: ActiveBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log writer for the tracing subscriber that hides the active bar
    /// while a line is written, so log lines do not tear it.
    pub fn log_writer(&self) -> BarAwareWriter {
        BarAwareWriter {
            current: Arc::clone(&self.current),
        }
    }

    fn bar_for(
        current: &mut Option<(BarKind, ProgressBar)>,
        kind: BarKind,
        total: u64,
    ) -> ProgressBar {
        if let Some((active, bar)) = current.as_ref() {
            if *active == kind {
                return bar.clone();
            }
            bar.finish_and_clear();
        }
        let bar = match kind {
            BarKind::Download => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.green} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
            BarKind::Extract | BarKind::Relocate => {
                let prefix = if kind == BarKind::Extract {
                    "Extracting"
                } else {
                    "Relocating"
                };
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(COUNTED_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                bar.set_prefix(prefix);
                bar
            }
        };
        *current = Some((kind, bar.clone()));
        bar
    }
}

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            ProgressEvent::Phase { .. } => {
                if let Some((_, bar)) = current.take() {
                    bar.finish_and_clear();
                }
            }
            ProgressEvent::Download { stats } => {
                let bar = Self::bar_for(&mut current, BarKind::Download, 0);
                bar.set_message(stats.render());
                bar.tick();
            }
            ProgressEvent::Extract { done, total } => {
                Self::bar_for(&mut current, BarKind::Extract, total).set_position(done);
            }
            ProgressEvent::Relocate { done, total } => {
                Self::bar_for(&mut current, BarKind::Relocate, total).set_position(done);
            }
            ProgressEvent::Finished { message, elapsed } => {
                let message = match elapsed {
                    Some(elapsed) => format!("{message} ({}s)", elapsed.as_secs()),
                    None => message,
                };
                match current.take() {
                    Some((BarKind::Download, bar)) => {
                        // Keep the final throughput line visible.
                        bar.finish();
                        eprintln!("{message}");
                    }
                    Some((_, bar)) => bar.finish_with_message(message),
                    None => eprintln!("{message}"),
                }
            }
        }
    }
}

/// Stderr writer that suspends whichever [`ConsoleProgress`] bar is drawing.
#[derive(Clone)]
pub struct BarAwareWriter {
    current: ActiveBar,
}

impl Write for BarAwareWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some((_, bar)) => bar.suspend(|| io::stderr().write(buf)),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for BarAwareWriter {
    type Writer = BarAwareWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
