// Input probing using ffprobe

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use super::core::{AudioChannels, FileRecord};
use crate::config::ToolPaths;
use crate::engine::process::run_with_timeout;

/// Answers per-file questions with short, time-bounded ffprobe runs
#[derive(Debug, Clone)]
pub struct FileInspector {
    ffprobe: PathBuf,
    timeout: std::time::Duration,
}

impl FileInspector {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            ffprobe: tools.ffprobe.clone(),
            timeout: tools.probe_timeout(),
        }
    }

    /// Run `ffprobe -v error -select_streams <sel> -show_entries <entries> -of csv=p=0`.
    ///
    /// Returns `None` on timeout, spawn failure or non-zero exit.
    pub fn query(&self, path: &Path, select: &str, entries: &str) -> Option<String> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error"]);
        if !select.is_empty() {
            cmd.args(["-select_streams", select]);
        }
        cmd.args(["-show_entries", entries, "-of", "csv=p=0"]);
        cmd.arg(path);

        let Some(output) = run_with_timeout(cmd, self.timeout) else {
            warn!(path = %path.display(), select, "ffprobe timed out or could not start");
            return None;
        };
        if !output.status.success() {
            debug!(
                path = %path.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ffprobe failed"
            );
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(path = %path.display(), select, entries, output = %stdout.trim(), "ffprobe");
        Some(stdout)
    }

    /// Stream 0 must be a video stream
    pub fn is_valid_video(&self, path: &Path) -> bool {
        self.query(path, "0", "stream=codec_type")
            .map(|out| parse_is_video(&out))
            .unwrap_or(false)
    }

    pub fn audio_channel_count(&self, path: &Path) -> AudioChannels {
        match self.query(path, "a:0", "stream=channels") {
            Some(out) => parse_audio_channels(&out),
            // Probe failure reads as "no audio" so the plan drops it cleanly
            None => AudioChannels::Absent,
        }
    }

    /// Subtitle tracks that mov_text can carry, by position among subtitle streams
    pub fn text_subtitle_streams(&self, path: &Path) -> Vec<usize> {
        let Some(out) = self.query(path, "s", "stream=codec_name") else {
            return Vec::new();
        };
        let text = parse_text_subtitles(&out);
        let total = out.lines().filter(|l| !l.trim().is_empty()).count();
        if text.len() < total {
            debug!(
                path = %path.display(),
                dropped = total - text.len(),
                "ignoring bitmap subtitle tracks"
            );
        }
        text
    }

    /// Width and height of the first video stream
    pub fn dimensions(&self, path: &Path) -> Option<(u32, u32)> {
        self.query(path, "v:0", "stream=width,height")
            .and_then(|out| parse_dimensions(&out))
    }

    /// Container duration in seconds
    pub fn duration(&self, path: &Path) -> Option<f64> {
        self.query(path, "", "format=duration")
            .and_then(|out| parse_duration(&out))
    }

    /// Full inspection. Invalid files short-circuit before the stream queries.
    pub fn inspect(&self, path: &Path) -> FileRecord {
        let original_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        if !self.is_valid_video(path) {
            return FileRecord::invalid(path.to_path_buf(), original_size);
        }

        FileRecord {
            input_path: path.to_path_buf(),
            original_size,
            is_video: true,
            audio: self.audio_channel_count(path),
            text_subtitles: self.text_subtitle_streams(path),
            external_subtitle: None,
        }
    }
}

fn first_value(output: &str) -> Option<&str> {
    output
        .lines()
        .map(|l| l.trim().trim_end_matches(','))
        .find(|l| !l.is_empty())
}

pub fn parse_is_video(output: &str) -> bool {
    first_value(output) == Some("video")
}

pub fn parse_audio_channels(output: &str) -> AudioChannels {
    match first_value(output) {
        None => AudioChannels::Absent,
        Some(value) => match value.parse::<u32>() {
            Ok(n) if n > 0 => AudioChannels::Count(n),
            _ => AudioChannels::Unknown,
        },
    }
}

/// Subtitle codecs ffmpeg can convert to mov_text
pub const TEXT_SUBTITLE_CODECS: &[&str] = &[
    "subrip", "srt", "ass", "ssa", "webvtt", "mov_text", "text",
];

/// One codec name per line, in subtitle stream order
pub fn parse_text_subtitles(output: &str) -> Vec<usize> {
    output
        .lines()
        .map(|l| l.trim().trim_end_matches(','))
        .filter(|l| !l.is_empty())
        .enumerate()
        .filter(|(_, codec)| TEXT_SUBTITLE_CODECS.contains(codec))
        .map(|(i, _)| i)
        .collect()
}

pub fn parse_dimensions(output: &str) -> Option<(u32, u32)> {
    let line = first_value(output)?;
    let (w, h) = line.split_once(',')?;
    let width = w.trim().parse().ok()?;
    let height = h.trim().parse().ok()?;
    Some((width, height))
}

pub fn parse_duration(output: &str) -> Option<f64> {
    first_value(output)?
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}
