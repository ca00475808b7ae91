use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Final status of one input file
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum JobStatus {
    #[serde(rename = "OK")]
    Ok,
    Failed,
    Invalid,
    Skipped,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Failed => "Failed",
            Self::Invalid => "Invalid",
            Self::Skipped => "Skipped",
        }
    }
}

/// Channel layout of the first audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioChannels {
    /// No audio stream at all
    Absent,
    /// Stream present, channel count unreadable
    Unknown,
    Count(u32),
}

impl AudioChannels {
    pub fn count(self) -> Option<u32> {
        match self {
            Self::Count(n) => Some(n),
            _ => None,
        }
    }
}

/// What inspection learned about one input
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub input_path: PathBuf,
    pub original_size: u64,
    pub is_video: bool,
    pub audio: AudioChannels,
    /// Positions, among the subtitle streams, of text tracks that can be
    /// converted to mov_text. Bitmap tracks (PGS, VobSub, DVB) are left out.
    pub text_subtitles: Vec<usize>,
    /// Sidecar `.srt` produced by the subtitle fetcher
    pub external_subtitle: Option<PathBuf>,
}

impl FileRecord {
    /// Record for a file that failed validation; nothing else is probed
    pub fn invalid(input_path: PathBuf, original_size: u64) -> Self {
        Self {
            input_path,
            original_size,
            is_video: false,
            audio: AudioChannels::Absent,
            text_subtitles: Vec::new(),
            external_subtitle: None,
        }
    }

    pub fn has_text_subtitles(&self) -> bool {
        !self.text_subtitles.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioPlan {
    Drop,
    Copy,
    Downmix { bitrate_k: u32 },
    Reencode { channels: Option<u32>, bitrate_k: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitlePlan {
    None,
    /// Subtitle-relative indices of the source tracks to keep
    Embedded(Vec<usize>),
    External(PathBuf),
}

/// Backend-specific rate control: optional mode args, then `<flag> <value>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityControl {
    pub rate_control: &'static [&'static str],
    pub flag: &'static str,
    pub value: u32,
}

/// Everything needed to run one encode
#[derive(Debug, Clone, PartialEq)]
pub struct EncodePlan {
    pub input_path: PathBuf,
    pub encoder: &'static str,
    /// Container tag for the video stream (`hvc1` for H.265)
    pub video_tag: Option<&'static str>,
    /// Device init args placed before the first input
    pub hw_init: Vec<String>,
    pub filter_chain: String,
    pub quality: QualityControl,
    pub audio: AudioPlan,
    pub subtitles: SubtitlePlan,
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    Success { output_bytes: u64, avg_fps: Option<f64> },
    Failure { reason: String },
}

/// One line of the run report
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileReport {
    pub filename: PathBuf,
    pub original_size_bytes: u64,
    pub final_size_bytes: Option<u64>,
    pub reduction_percent: Option<String>,
    #[serde(serialize_with = "serialize_fps")]
    pub avg_fps: Option<f64>,
    pub status: JobStatus,
    /// Why the file was skipped or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn serialize_fps<S: Serializer>(fps: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match fps {
        Some(v) => s.serialize_f64(*v),
        None => s.serialize_str("unknown"),
    }
}

impl FileReport {
    fn base(path: &Path, original_size: u64, status: JobStatus) -> Self {
        Self {
            filename: path.to_path_buf(),
            original_size_bytes: original_size,
            final_size_bytes: None,
            reduction_percent: None,
            avg_fps: None,
            status,
            detail: None,
        }
    }

    pub fn ok(
        path: &Path,
        original_size: u64,
        final_size: u64,
        reduction: String,
        avg_fps: Option<f64>,
    ) -> Self {
        Self {
            final_size_bytes: Some(final_size),
            reduction_percent: Some(reduction),
            avg_fps,
            ..Self::base(path, original_size, JobStatus::Ok)
        }
    }

    pub fn failed(path: &Path, original_size: u64, reason: impl Into<String>) -> Self {
        Self {
            detail: Some(reason.into()),
            ..Self::base(path, original_size, JobStatus::Failed)
        }
    }

    pub fn invalid(path: &Path, original_size: u64) -> Self {
        Self::base(path, original_size, JobStatus::Invalid)
    }

    pub fn skipped(path: &Path, original_size: u64, reason: impl Into<String>) -> Self {
        Self {
            detail: Some(reason.into()),
            ..Self::base(path, original_size, JobStatus::Skipped)
        }
    }

    /// Bytes saved by this file (negative if the output grew)
    pub fn bytes_saved(&self) -> i64 {
        match self.final_size_bytes {
            Some(final_size) => self.original_size_bytes as i64 - final_size as i64,
            None => 0,
        }
    }
}

/// Totals for one run
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    pub total_files_seen: usize,
    pub total_files_processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub total_bytes_saved: i64,
    pub duration_seconds: f64,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Local>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            total_files_seen: 0,
            total_files_processed: 0,
            failed: 0,
            skipped: 0,
            invalid: 0,
            total_bytes_saved: 0,
            duration_seconds: 0.0,
        }
    }

    /// Fold one file's report into the totals
    pub fn absorb(&mut self, report: &FileReport) {
        self.total_files_seen += 1;
        match report.status {
            JobStatus::Ok => {
                self.total_files_processed += 1;
                self.total_bytes_saved += report.bytes_saved();
            }
            JobStatus::Failed => self.failed += 1,
            JobStatus::Invalid => self.invalid += 1,
            JobStatus::Skipped => self.skipped += 1,
        }
    }
}

/// Parser for ffmpeg progress output (key=value format)
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub out_time_us: u64,
    pub fps: Option<f64>,
    pub speed: Option<f64>,
    pub total_size: Option<u64>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single line of ffmpeg progress output.
    ///
    /// Also accepts stats lines (`frame=  120 fps= 23.4 q=28.0 ...`) where the
    /// value may be separated from its key by spaces.
    pub fn parse_line(&mut self, line: &str) {
        if line.contains("fps=") && line.contains("frame=") {
            self.parse_stats_line(line);
            return;
        }

        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            match key.trim() {
                "out_time_us" => {
                    if let Ok(us) = value.parse::<u64>() {
                        self.out_time_us = us;
                    }
                }
                "fps" => self.set_fps(value),
                "speed" => {
                    // Speed is in format "1.23x", strip the 'x'
                    if let Ok(s) = value.trim_end_matches('x').parse::<f64>() {
                        self.speed = Some(s);
                    }
                }
                "total_size" => {
                    if let Ok(size) = value.parse::<u64>() {
                        self.total_size = Some(size);
                    }
                }
                _ => {}
            }
        }
    }

    fn parse_stats_line(&mut self, line: &str) {
        if let Some(idx) = line.find("fps=") {
            let rest = line[idx + 4..].trim_start();
            let token = rest.split_whitespace().next().unwrap_or("");
            self.set_fps(token);
        }
    }

    fn set_fps(&mut self, value: &str) {
        // ffmpeg reports 0.00 until the first frames are out; keep the last real value
        if let Ok(f) = value.parse::<f64>() {
            if f.is_finite() && f > 0.0 {
                self.fps = Some(f);
            }
        }
    }

    /// Get output time in seconds
    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Calculate progress percentage given total duration
    pub fn progress_pct(&self, duration_s: Option<f64>) -> f64 {
        if let Some(dur) = duration_s {
            if dur > 0.0 {
                return (self.out_time_s() / dur * 100.0).min(100.0);
            }
        }
        0.0
    }
}
