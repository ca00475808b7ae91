use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use super::types::{AudioChannels, AudioPlan, EncodePlan, FileRecord, QualityControl, SubtitlePlan};
use crate::config::{AudioMode, RunConfig, VideoCodec};
use crate::engine::hardware::HardwareBackend;

/// Inserted before the extension of the file being written
pub const TEMP_MARKER: &str = ".inprogress";
/// Appended to the stem of outputs written in keep mode
pub const OPTIMIZED_MARKER: &str = "-optimized";
/// All outputs are MP4
pub const OUTPUT_CONTAINER: &str = "mp4";

pub const STEREO_BITRATE_K: u32 = 192;
pub const SURROUND_BITRATE_K: u32 = 384;

/// Result of planning one file
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDecision {
    Encode(EncodePlan),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Keep mode and an optimized copy already exists
    OutputExists(PathBuf),
    /// Overwrite mode, but the output name belongs to a different file
    NameTaken(PathBuf),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputExists(path) => write!(f, "output already exists: {}", path.display()),
            Self::NameTaken(path) => {
                write!(f, "output name taken by another file: {}", path.display())
            }
        }
    }
}

fn sibling_with_suffix(input: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(suffix);
    name.push(".");
    name.push(OUTPUT_CONTAINER);
    input.with_file_name(name)
}

/// `<stem>.inprogress.mp4` next to the input
pub fn temp_path(input: &Path) -> PathBuf {
    sibling_with_suffix(input, TEMP_MARKER)
}

/// `<stem>.mp4` when overwriting, `<stem>-optimized.mp4` otherwise
pub fn final_path(input: &Path, overwrite: bool) -> PathBuf {
    if overwrite {
        sibling_with_suffix(input, "")
    } else {
        sibling_with_suffix(input, OPTIMIZED_MARKER)
    }
}

/// Output width for `scale=-2:<target_height>`: aspect kept, rounded to even.
///
/// `None` when the source has a zero dimension.
pub fn scaled_width(src_width: u32, src_height: u32, target_height: u32) -> Option<u32> {
    if src_width == 0 || src_height == 0 {
        return None;
    }
    let den = u64::from(src_height) * 2;
    let half = (u64::from(target_height) * u64::from(src_width) + den / 2) / den;
    let width = half.max(1) * 2;
    u32::try_from(width).ok()
}

pub fn encoder_name(codec: VideoCodec, backend: &HardwareBackend) -> &'static str {
    match (codec, backend) {
        (VideoCodec::H264, HardwareBackend::Cpu) => "libx264",
        (VideoCodec::H265, HardwareBackend::Cpu) => "libx265",
        (VideoCodec::H264, HardwareBackend::Nvenc) => "h264_nvenc",
        (VideoCodec::H265, HardwareBackend::Nvenc) => "hevc_nvenc",
        (VideoCodec::H264, HardwareBackend::QuickSync { .. }) => "h264_qsv",
        (VideoCodec::H265, HardwareBackend::QuickSync { .. }) => "hevc_qsv",
        (VideoCodec::H264, HardwareBackend::Vaapi { .. }) => "h264_vaapi",
        (VideoCodec::H265, HardwareBackend::Vaapi { .. }) => "hevc_vaapi",
    }
}

pub fn filter_chain(height: u32, backend: &HardwareBackend) -> String {
    let scale = format!("scale=-2:{height}");
    match backend {
        HardwareBackend::Cpu | HardwareBackend::Nvenc => scale,
        HardwareBackend::QuickSync { .. } => {
            format!("{scale},format=nv12,hwupload=extra_hw_frames=64")
        }
        HardwareBackend::Vaapi { .. } => format!("{scale},format=nv12,hwupload"),
    }
}

/// Device init args, emitted before the first `-i`
pub fn hw_init_args(backend: &HardwareBackend) -> Vec<String> {
    let (kind, name, device) = match backend {
        HardwareBackend::Cpu | HardwareBackend::Nvenc => return Vec::new(),
        HardwareBackend::QuickSync { device } => ("qsv", "qs", device),
        HardwareBackend::Vaapi { device } => ("vaapi", "va", device),
    };
    vec![
        "-init_hw_device".to_string(),
        format!("{kind}={name}:{}", device.display()),
        "-filter_hw_device".to_string(),
        name.to_string(),
    ]
}

/// The quality number is passed through unchanged; only the knob differs
pub fn quality_control(backend: &HardwareBackend, quality: u32) -> QualityControl {
    let (rate_control, flag): (&'static [&'static str], &'static str) = match backend {
        HardwareBackend::Cpu => (&[], "-crf"),
        HardwareBackend::Nvenc => (&["-rc", "vbr"], "-cq"),
        HardwareBackend::QuickSync { .. } => (&[], "-global_quality"),
        HardwareBackend::Vaapi { .. } => (&[], "-qp"),
    };
    QualityControl {
        rate_control,
        flag,
        value: quality,
    }
}

pub fn audio_plan(mode: AudioMode, audio: AudioChannels) -> AudioPlan {
    match (audio, mode) {
        (AudioChannels::Absent, _) => AudioPlan::Drop,
        (_, AudioMode::Copy) => AudioPlan::Copy,
        (AudioChannels::Count(n), AudioMode::Downmix) if n > 2 => AudioPlan::Downmix {
            bitrate_k: STEREO_BITRATE_K,
        },
        (channels, _) => {
            let channels = channels.count();
            let bitrate_k = match channels {
                Some(n) if n > 2 => SURROUND_BITRATE_K,
                _ => STEREO_BITRATE_K,
            };
            AudioPlan::Reencode {
                channels,
                bitrate_k,
            }
        }
    }
}

pub fn subtitle_plan(record: &FileRecord) -> SubtitlePlan {
    if record.has_text_subtitles() {
        SubtitlePlan::Embedded(record.text_subtitles.clone())
    } else if let Some(sidecar) = &record.external_subtitle {
        SubtitlePlan::External(sidecar.clone())
    } else {
        SubtitlePlan::None
    }
}

/// Derive the full encode plan for one inspected file.
///
/// Pure apart from checking whether the final path already exists.
pub fn plan(config: &RunConfig, backend: &HardwareBackend, record: &FileRecord) -> PlanDecision {
    let input = &record.input_path;
    let overwrite = config.behavior.overwrite;
    let final_path = final_path(input, overwrite);

    if final_path.exists() {
        if !overwrite {
            return PlanDecision::Skip(SkipReason::OutputExists(final_path));
        }
        if final_path != *input {
            return PlanDecision::Skip(SkipReason::NameTaken(final_path));
        }
    }

    let codec = config.encode.codec;
    PlanDecision::Encode(EncodePlan {
        input_path: input.clone(),
        encoder: encoder_name(codec, backend),
        video_tag: match codec {
            VideoCodec::H265 => Some("hvc1"),
            VideoCodec::H264 => None,
        },
        hw_init: hw_init_args(backend),
        filter_chain: filter_chain(config.encode.resolution.height(), backend),
        quality: quality_control(backend, config.encode.quality),
        audio: audio_plan(config.encode.audio_mode, record.audio),
        subtitles: subtitle_plan(record),
        temp_path: temp_path(input),
        final_path,
    })
}
