//! Sequential batch run: scan, then inspect/plan/encode/commit each file

use chrono::Local;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::cancel::{CancelToken, InFlight, remove_if_exists};
use super::core::{
    EncodeOutcome, EncodePlan, FileReport, PlanDecision, ProgressParser, RunSummary, SkipReason,
    SubtitlePlan, build_ffmpeg_cmd, commit, format_ffmpeg_cmd, invoke, plan, scaled_width, scan,
    subtitle_plan,
};
use super::hardware::HardwareBackend;
use super::probe::FileInspector;
use super::subtitles::{SubtitleFetcher, find_sidecar};
use crate::config::RunConfig;
use crate::error::{InvokeError, RunError};
use crate::report::{ReportSink, format_bytes};

/// What a run would do with one file, without touching it
#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Invalid,
    Skip(SkipReason),
    Encode {
        command: String,
        output_width: Option<u32>,
    },
}

pub struct RunCoordinator<'a> {
    config: &'a RunConfig,
    backend: HardwareBackend,
    inspector: FileInspector,
    subtitles: Option<SubtitleFetcher>,
    cancel: CancelToken,
    in_flight: InFlight,
    show_progress: bool,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(
        config: &'a RunConfig,
        backend: HardwareBackend,
        cancel: CancelToken,
        in_flight: InFlight,
    ) -> Self {
        let subtitles = config
            .behavior
            .fetch_subtitles
            .then(|| SubtitleFetcher::new(&config.tools, &config.behavior.subtitle_language));

        Self {
            config,
            backend,
            inspector: FileInspector::new(&config.tools),
            subtitles,
            cancel,
            in_flight,
            show_progress: std::io::stderr().is_terminal(),
        }
    }

    /// Disable the live progress line (for non-interactive callers)
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Process every candidate under the target directory, one at a time.
    ///
    /// Per-file problems become report records. Only a missing target or a
    /// user interrupt ends the run early, and neither reaches `sink.finish`.
    pub fn run(&self, sink: &mut dyn ReportSink) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        let mut summary = RunSummary::new(Local::now());

        let target = &self.config.target_dir;
        let files = scan(target, self.config.behavior.recursive)?;
        info!(
            run_id = %summary.run_id,
            target = %target.display(),
            files = files.len(),
            backend = %self.backend,
            "starting run"
        );

        let mut last = None;
        for path in files {
            self.check_cancelled(&path)?;

            let report = self.process_file(&path)?;
            sink.record(&report);
            summary.absorb(&report);
            last = Some(path);
        }

        // An interrupt that arrived while the last file was committing still counts
        self.check_cancelled(last.as_deref().unwrap_or(target.as_path()))?;

        summary.duration_seconds = started.elapsed().as_secs_f64();
        info!(
            processed = summary.total_files_processed,
            failed = summary.failed,
            skipped = summary.skipped,
            invalid = summary.invalid,
            bytes_saved = summary.total_bytes_saved,
            "run complete"
        );
        if let Err(e) = sink.finish(&summary) {
            warn!("failed to write run report: {:#}", e);
        }

        Ok(summary)
    }

    /// Inspect, plan, encode and commit a single file
    pub fn process_file(&self, path: &Path) -> Result<FileReport, RunError> {
        debug!(path = %path.display(), "inspecting");
        let mut record = self.inspector.inspect(path);
        self.check_cancelled(path)?;
        if !record.is_video {
            info!(path = %path.display(), "not a valid video, skipping");
            return Ok(FileReport::invalid(path, record.original_size));
        }

        let mut plan = match plan(self.config, &self.backend, &record) {
            PlanDecision::Encode(plan) => plan,
            PlanDecision::Skip(reason) => {
                info!(path = %path.display(), %reason, "skipping");
                return Ok(FileReport::skipped(
                    path,
                    record.original_size,
                    reason.to_string(),
                ));
            }
        };

        // Only fetch for files that will actually be encoded
        if plan.subtitles == SubtitlePlan::None {
            if let Some(sidecar) = self.sidecar_for(path) {
                record.external_subtitle = Some(sidecar);
                plan.subtitles = subtitle_plan(&record);
            }
            self.check_cancelled(path)?;
        }

        // Left behind by an earlier interrupted run; ffmpeg -n would refuse it
        if plan.temp_path.exists() {
            info!(temp = %plan.temp_path.display(), "removing stale temp output");
            remove_if_exists(&plan.temp_path);
        }

        info!(
            path = %path.display(),
            encoder = plan.encoder,
            output = %plan.final_path.display(),
            "encoding"
        );
        let _guard = self.in_flight.track(&plan.temp_path);
        let outcome = self.encode(&plan).map_err(|InvokeError::Interrupted| {
            RunError::Interrupted {
                file: path.to_path_buf(),
            }
        })?;

        Ok(commit(
            &plan,
            &record,
            &outcome,
            self.config.behavior.overwrite,
        ))
    }

    fn check_cancelled(&self, path: &Path) -> Result<(), RunError> {
        if self.cancel.is_cancelled() {
            return Err(RunError::Interrupted {
                file: path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn sidecar_for(&self, path: &Path) -> Option<PathBuf> {
        let fetcher = self.subtitles.as_ref()?;
        find_sidecar(path, &self.config.behavior.subtitle_language)
            .or_else(|| fetcher.fetch(path))
    }

    fn encode(&self, plan: &EncodePlan) -> Result<EncodeOutcome, InvokeError> {
        let ffmpeg = &self.config.tools.ffmpeg;
        if !self.show_progress {
            return invoke(ffmpeg, plan, &self.cancel, |_| {});
        }

        let duration = self.inspector.duration(&plan.input_path);
        let result = invoke(ffmpeg, plan, &self.cancel, |parser: &ProgressParser| {
            let mut line = format!("\rProgress: {:.1}%", parser.progress_pct(duration));
            if let Some(fps) = parser.fps {
                line.push_str(&format!(" | FPS: {fps:.1}"));
            }
            if let Some(speed) = parser.speed {
                line.push_str(&format!(" | Speed: {speed:.2}x"));
            }
            if let Some(size) = parser.total_size {
                line.push_str(&format!(" | Size: {}", format_bytes(size)));
            }
            let mut err = std::io::stderr();
            let _ = write!(err, "{line}");
            let _ = err.flush();
        });
        eprintln!();
        result
    }

    /// Inspect and plan every candidate without encoding anything
    pub fn preview(&self) -> Result<Vec<(PathBuf, Preview)>, RunError> {
        let files = scan(&self.config.target_dir, self.config.behavior.recursive)?;
        let height = self.config.encode.resolution.height();

        Ok(files
            .into_iter()
            .map(|path| {
                let mut record = self.inspector.inspect(&path);
                if !record.is_video {
                    return (path, Preview::Invalid);
                }
                if !record.has_text_subtitles() && self.subtitles.is_some() {
                    record.external_subtitle =
                        find_sidecar(&path, &self.config.behavior.subtitle_language);
                }
                let preview = match plan(self.config, &self.backend, &record) {
                    PlanDecision::Skip(reason) => Preview::Skip(reason),
                    PlanDecision::Encode(plan) => Preview::Encode {
                        command: format_ffmpeg_cmd(&build_ffmpeg_cmd(
                            &self.config.tools.ffmpeg,
                            &plan,
                        )),
                        output_width: self
                            .inspector
                            .dimensions(&path)
                            .and_then(|(w, h)| scaled_width(w, h, height)),
                    },
                };
                (path, preview)
            })
            .collect())
    }
}
