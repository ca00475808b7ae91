// Per-file records and run summaries

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::engine::{FileReport, JobStatus, RunSummary};

/// Receives one record per file and the summary at the end of a run
pub trait ReportSink {
    fn record(&mut self, report: &FileReport);

    fn finish(&mut self, summary: &RunSummary) -> Result<()>;
}

/// Fans records out to several sinks
#[derive(Default)]
pub struct ReportSet {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl ReportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl ReportSink for ReportSet {
    fn record(&mut self, report: &FileReport) {
        for sink in &mut self.sinks {
            sink.record(report);
        }
    }

    /// Every sink gets the summary; the first error is returned
    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        let mut result = Ok(());
        for sink in &mut self.sinks {
            if let Err(e) = sink.finish(summary) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

// ============================================================================
// Console
// ============================================================================

/// One status line per file and a closing summary block
pub struct ConsoleReport<W: Write = io::Stdout> {
    out: W,
}

impl ConsoleReport<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn status_line(report: &FileReport) -> String {
    let name = report.filename.display();
    match report.status {
        JobStatus::Ok => {
            let final_size = report.final_size_bytes.unwrap_or(0);
            let fps = report
                .avg_fps
                .map(|f| format!("{f:.1} fps"))
                .unwrap_or_else(|| "unknown fps".to_string());
            format!(
                "[OK] {}: {} -> {} ({}, {})",
                name,
                format_bytes(report.original_size_bytes),
                format_bytes(final_size),
                report.reduction_percent.as_deref().unwrap_or("0"),
                fps
            )
        }
        JobStatus::Invalid => format!("[Invalid] {name}: not a video file"),
        JobStatus::Failed | JobStatus::Skipped => format!(
            "[{}] {}: {}",
            report.status.as_str(),
            name,
            report.detail.as_deref().unwrap_or("no details")
        ),
    }
}

/// Format a signed byte delta ("1.50 MB saved" / "200 B larger")
pub fn format_space_saved(bytes_saved: i64) -> String {
    if bytes_saved >= 0 {
        format!("{} saved", format_bytes(bytes_saved.unsigned_abs()))
    } else {
        format!("{} larger", format_bytes(bytes_saved.unsigned_abs()))
    }
}

impl<W: Write> ReportSink for ConsoleReport<W> {
    fn record(&mut self, report: &FileReport) {
        // A closed stdout must not fail the run
        let _ = writeln!(self.out, "{}", status_line(report));
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "Run summary")?;
        writeln!(self.out, "  Files seen:      {}", summary.total_files_seen)?;
        writeln!(self.out, "  Processed (OK):  {}", summary.total_files_processed)?;
        writeln!(self.out, "  Failed:          {}", summary.failed)?;
        writeln!(self.out, "  Skipped:         {}", summary.skipped)?;
        writeln!(self.out, "  Invalid:         {}", summary.invalid)?;
        writeln!(
            self.out,
            "  Space:           {}",
            format_space_saved(summary.total_bytes_saved)
        )?;
        writeln!(
            self.out,
            "  Duration:        {}",
            format_duration(summary.duration_seconds)
        )?;
        self.out.flush()?;
        Ok(())
    }
}

// ============================================================================
// JSON
// ============================================================================

#[derive(Serialize)]
struct ReportDocument<'a> {
    summary: &'a RunSummary,
    files: &'a [FileReport],
}

/// Collects records and writes `{summary, files}` when the run finishes
pub struct JsonReport {
    dir: PathBuf,
    files: Vec<FileReport>,
    written: Option<PathBuf>,
}

/// `<dir>/vidopt-report-<YYYYmmdd-HHMMSS>.json`
pub fn report_path(dir: &Path, started_at: &DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "vidopt-report-{}.json",
        started_at.format("%Y%m%d-%H%M%S")
    ))
}

impl JsonReport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            written: None,
        }
    }

    /// Where the report went, once `finish` succeeded
    pub fn written_path(&self) -> Option<&Path> {
        self.written.as_deref()
    }
}

impl ReportSink for JsonReport {
    fn record(&mut self, report: &FileReport) {
        self.files.push(report.clone());
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<()> {
        let path = report_path(&self.dir, &summary.started_at);
        let doc = ReportDocument {
            summary,
            files: &self.files,
        };
        let contents = serde_json::to_string_pretty(&doc).context("Failed to serialize report")?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;

        info!(path = %path.display(), "wrote run report");
        self.written = Some(path);
        Ok(())
    }
}

// ============================================================================
// Formatting
// ============================================================================

/// Format bytes as human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in seconds as human-readable time
pub fn format_duration(seconds: f64) -> String {
    let total_secs = seconds as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
