mod commit;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod plan;
mod scan;
mod types;

pub use commit::{commit, format_reduction};
pub use ffmpeg_cmd::{build_ffmpeg_cmd, format_ffmpeg_cmd, invoke};
pub use ffmpeg_info::{ffmpeg_version, ffprobe_version};
pub use plan::{
    OPTIMIZED_MARKER, OUTPUT_CONTAINER, PlanDecision, STEREO_BITRATE_K, SURROUND_BITRATE_K,
    SkipReason, TEMP_MARKER, audio_plan, encoder_name, filter_chain, final_path, hw_init_args,
    plan, quality_control, scaled_width, subtitle_plan, temp_path,
};
pub use scan::{is_generated_output, is_video_file, scan, scan_streaming};
pub use types::{
    AudioChannels, AudioPlan, EncodeOutcome, EncodePlan, FileRecord, FileReport, JobStatus,
    ProgressParser, QualityControl, RunSummary, SubtitlePlan,
};
