// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Highest quality value any supported rate-control knob accepts
pub const MAX_QUALITY: u32 = 51;

/// Target output height. Unknown heights collapse to the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Resolution {
    P720,
    #[default]
    P1080,
    P2160,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::P720, Resolution::P1080, Resolution::P2160];

    pub fn height(self) -> u32 {
        match self {
            Self::P720 => 720,
            Self::P1080 => 1080,
            Self::P2160 => 2160,
        }
    }
}

impl From<u32> for Resolution {
    fn from(height: u32) -> Self {
        match height {
            720 => Self::P720,
            1080 => Self::P1080,
            2160 => Self::P2160,
            other => {
                let fallback = Self::default();
                warn!(
                    requested = other,
                    "unsupported resolution, using {}p",
                    fallback.height()
                );
                fallback
            }
        }
    }
}

impl From<Resolution> for u32 {
    fn from(res: Resolution) -> Self {
        res.height()
    }
}

/// Video codec family. Accepts the usual spellings (264, h264, avc, x264, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoCodec {
    H264,
    #[default]
    H265,
}

impl VideoCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
        }
    }
}

impl From<&str> for VideoCodec {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "264" | "h264" | "h.264" | "avc" | "x264" => Self::H264,
            "265" | "h265" | "h.265" | "hevc" | "x265" => Self::H265,
            other => {
                let fallback = Self::default();
                warn!(
                    requested = other,
                    "unsupported codec, using {}",
                    fallback.as_str()
                );
                fallback
            }
        }
    }
}

impl From<String> for VideoCodec {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<VideoCodec> for String {
    fn from(codec: VideoCodec) -> Self {
        codec.as_str().to_string()
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::H264 => "H.264",
            Self::H265 => "H.265",
        })
    }
}

/// How the first audio stream is carried into the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioMode {
    /// Pass the original stream through untouched
    #[default]
    Copy,
    /// Re-encode surround sources to stereo AAC
    Downmix,
    /// Re-encode to AAC keeping the source channel count
    Reencode,
}

impl FromStr for AudioMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" | "passthrough" => Ok(Self::Copy),
            "downmix" | "stereo" => Ok(Self::Downmix),
            "reencode" | "aac" => Ok(Self::Reencode),
            other => Err(format!(
                "unknown audio mode '{}' (expected copy, downmix or reencode)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub encode: EncodeConfig,

    #[serde(default)]
    pub behavior: BehaviorConfig,

    #[serde(default)]
    pub tools: ToolPaths,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodeConfig {
    /// Output height (720, 1080 or 2160)
    #[serde(default)]
    pub resolution: Resolution,

    #[serde(default)]
    pub codec: VideoCodec,

    /// Passed unchanged to the backend's rate-control knob (crf / cq / global_quality / qp)
    #[serde(default = "default_quality")]
    pub quality: u32,

    #[serde(default)]
    pub audio_mode: AudioMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorConfig {
    /// Descend into subdirectories when scanning
    #[serde(default)]
    pub recursive: bool,

    /// Replace originals in place instead of writing `-optimized` siblings
    #[serde(default)]
    pub overwrite: bool,

    /// Force CPU encoding even when a hardware backend is available
    #[serde(default)]
    pub disable_hardware: bool,

    /// Try to download subtitles for files that carry none
    #[serde(default)]
    pub fetch_subtitles: bool,

    #[serde(default = "default_subtitle_language")]
    pub subtitle_language: String,

    /// Write a JSON run report into the target directory
    #[serde(default)]
    pub generate_report: bool,
}

/// External programs and the time budget granted to the short-lived ones
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolPaths {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,

    #[serde(default = "default_subtitle_fetcher")]
    pub subtitle_fetcher: PathBuf,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_subtitle_timeout_secs")]
    pub subtitle_timeout_secs: u64,
}

fn default_quality() -> u32 {
    23
}

fn default_subtitle_language() -> String {
    "en".to_string()
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_subtitle_fetcher() -> PathBuf {
    PathBuf::from("subliminal")
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_subtitle_timeout_secs() -> u64 {
    120
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            codec: VideoCodec::default(),
            quality: default_quality(),
            audio_mode: AudioMode::default(),
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            overwrite: false,        // Keep originals unless asked
            disable_hardware: false, // Auto-detect
            fetch_subtitles: false,
            subtitle_language: default_subtitle_language(),
            generate_report: false,
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            subtitle_fetcher: default_subtitle_fetcher(),
            probe_timeout_secs: default_probe_timeout_secs(),
            subtitle_timeout_secs: default_subtitle_timeout_secs(),
        }
    }
}

impl ToolPaths {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn subtitle_timeout(&self) -> Duration {
        Duration::from_secs(self.subtitle_timeout_secs.max(1))
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("vidopt");

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();

            // Don't fail the run over an unwritable config directory
            if let Err(e) = config.save() {
                warn!("could not create default config file: {:#}", e);
            }

            Ok(config)
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Freeze the configuration for a run against `target_dir`
    pub fn into_run_config(self, target_dir: PathBuf) -> RunConfig {
        let mut encode = self.encode;
        if encode.quality > MAX_QUALITY {
            warn!(
                requested = encode.quality,
                "quality out of range, clamping to {}", MAX_QUALITY
            );
            encode.quality = MAX_QUALITY;
        }

        RunConfig {
            target_dir,
            encode,
            behavior: self.behavior,
            tools: self.tools,
        }
    }
}

/// Immutable settings for one batch run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target_dir: PathBuf,
    pub encode: EncodeConfig,
    pub behavior: BehaviorConfig,
    pub tools: ToolPaths,
}
