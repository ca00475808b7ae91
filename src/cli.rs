use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vidopt::config::{AudioMode, Config, Resolution, VideoCodec};

#[derive(Parser)]
#[command(name = "vidopt")]
#[command(about = "Batch video optimizer with hardware-accelerated ffmpeg encoding", long_about = None)]
pub struct Cli {
    /// Root directory to scan for video files (defaults to current directory)
    #[arg(value_name = "DIRECTORY")]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also append logs to this file
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

/// Per-run overrides for values from the config file
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Descend into subdirectories
    #[arg(short, long, global = true)]
    pub recursive: bool,

    /// Target height: 720, 1080 or 2160
    #[arg(long, value_name = "HEIGHT", global = true)]
    pub resolution: Option<u32>,

    /// Video codec: h264 or h265
    #[arg(long, global = true)]
    pub codec: Option<String>,

    /// Quality value (CRF/CQ/QP, lower is better)
    #[arg(short, long, global = true)]
    pub quality: Option<u32>,

    /// Audio handling: copy, downmix or reencode
    #[arg(long, global = true)]
    pub audio: Option<AudioMode>,

    /// Download subtitles for files that have none
    #[arg(long, global = true)]
    pub subtitles: bool,

    /// Subtitle language code
    #[arg(long, value_name = "LANG", global = true)]
    pub subtitle_lang: Option<String>,

    /// Replace originals instead of writing <name>-optimized.mp4
    #[arg(long, conflicts_with = "keep", global = true)]
    pub overwrite: bool,

    /// Keep originals and write <name>-optimized.mp4 (overrides config)
    #[arg(long, conflicts_with = "overwrite", global = true)]
    pub keep: bool,

    /// Force software encoding
    #[arg(long, global = true)]
    pub no_hw: bool,

    /// Write a JSON report into the target directory
    #[arg(long, global = true)]
    pub report: bool,
}

impl RunArgs {
    /// Apply command line overrides on top of a loaded config
    pub fn apply(&self, config: &mut Config) {
        if self.recursive {
            config.behavior.recursive = true;
        }
        if let Some(height) = self.resolution {
            config.encode.resolution = Resolution::from(height);
        }
        if let Some(codec) = &self.codec {
            config.encode.codec = VideoCodec::from(codec.as_str());
        }
        if let Some(quality) = self.quality {
            config.encode.quality = quality;
        }
        if let Some(audio) = self.audio {
            config.encode.audio_mode = audio;
        }
        if self.subtitles {
            config.behavior.fetch_subtitles = true;
        }
        if let Some(lang) = &self.subtitle_lang {
            config.behavior.subtitle_language = lang.clone();
        }
        if self.overwrite {
            config.behavior.overwrite = true;
        } else if self.keep {
            config.behavior.overwrite = false;
        }
        if self.no_hw {
            config.behavior.disable_hardware = true;
        }
        if self.report {
            config.behavior.generate_report = true;
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckTools,

    /// Show which encoding backend would be used and why
    DetectHw,

    /// Show ffmpeg commands without executing (dry run)
    DryRun {
        /// Directory to scan (defaults to current directory)
        directory: Option<PathBuf>,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
