// Encode plans translated into ffmpeg argument vectors

use insta::assert_snapshot;
use std::path::{Path, PathBuf};
use vidopt::config::{AudioMode, Config, Resolution, RunConfig, VideoCodec};
use vidopt::engine::{
    AudioChannels, EncodePlan, HardwareBackend, PlanDecision, build_ffmpeg_cmd, plan,
};

use crate::common::helpers::*;

fn config(tweak: impl FnOnce(&mut Config)) -> RunConfig {
    let mut config = Config::default();
    tweak(&mut config);
    config.into_run_config(PathBuf::from("/media"))
}

fn encode_plan(config: &RunConfig, backend: &HardwareBackend, rec: &vidopt::engine::FileRecord) -> EncodePlan {
    match plan(config, backend, rec) {
        PlanDecision::Encode(plan) => plan,
        PlanDecision::Skip(reason) => panic!("unexpected skip: {}", reason),
    }
}

fn args(plan: &EncodePlan) -> String {
    build_ffmpeg_cmd(Path::new("ffmpeg"), plan)
        .get_args()
        .map(|a| a.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn vaapi() -> HardwareBackend {
    HardwareBackend::Vaapi {
        device: PathBuf::from("/dev/dri/renderD128"),
    }
}

fn qsv() -> HardwareBackend {
    HardwareBackend::QuickSync {
        device: PathBuf::from("/dev/dri/renderD129"),
    }
}

// ============================================================================
// SNAPSHOTS: one representative command per backend
// ============================================================================

#[test]
fn snapshot_cpu_h265_copy() {
    let cfg = config(|_| {});
    let rec = record("/media/clip.mkv", AudioChannels::Count(2), false);
    let plan = encode_plan(&cfg, &HardwareBackend::Cpu, &rec);
    assert_snapshot!(args(&plan), @"-hide_banner -nostdin -n -i /media/clip.mkv -progress pipe:1 -nostats -map 0:v:0 -map 0:a:0 -vf scale=-2:1080 -c:v libx265 -tag:v hvc1 -crf 23 -c:a copy -movflags +faststart -f mp4 /media/clip.inprogress.mp4");
}

#[test]
fn snapshot_nvenc_h264_downmix() {
    let cfg = config(|c| {
        c.encode.codec = VideoCodec::H264;
        c.encode.resolution = Resolution::P720;
        c.encode.audio_mode = AudioMode::Downmix;
        c.behavior.overwrite = true;
    });
    let rec = record("/media/film.avi", AudioChannels::Count(6), false);
    let plan = encode_plan(&cfg, &HardwareBackend::Nvenc, &rec);
    assert_snapshot!(args(&plan), @"-hide_banner -nostdin -n -i /media/film.avi -progress pipe:1 -nostats -map 0:v:0 -map 0:a:0 -vf scale=-2:720 -c:v h264_nvenc -rc vbr -cq 23 -c:a aac -ac 2 -b:a 192k -movflags +faststart -f mp4 /media/film.inprogress.mp4");
    assert_eq!(plan.final_path, PathBuf::from("/media/film.mp4"));
}

#[test]
fn snapshot_vaapi_h265_subtitles() {
    let cfg = config(|c| {
        c.encode.quality = 20;
        c.encode.audio_mode = AudioMode::Reencode;
    });
    let rec = record("/media/show.mov", AudioChannels::Count(6), true);
    let plan = encode_plan(&cfg, &vaapi(), &rec);
    assert_snapshot!(args(&plan), @"-hide_banner -nostdin -n -init_hw_device vaapi=va:/dev/dri/renderD128 -filter_hw_device va -i /media/show.mov -progress pipe:1 -nostats -map 0:v:0 -map 0:a:0 -map 0:s:0 -vf scale=-2:1080,format=nv12,hwupload -c:v hevc_vaapi -tag:v hvc1 -qp 20 -c:a aac -ac 6 -b:a 384k -c:s mov_text -movflags +faststart -f mp4 /media/show.inprogress.mp4");
}

#[test]
fn snapshot_qsv_h264_no_audio() {
    let cfg = config(|c| {
        c.encode.codec = VideoCodec::H264;
        c.encode.resolution = Resolution::P2160;
    });
    let rec = record("/media/timelapse.mp4", AudioChannels::Absent, false);
    let plan = encode_plan(&cfg, &qsv(), &rec);
    assert_snapshot!(args(&plan), @"-hide_banner -nostdin -n -init_hw_device qsv=qs:/dev/dri/renderD129 -filter_hw_device qs -i /media/timelapse.mp4 -progress pipe:1 -nostats -map 0:v:0 -vf scale=-2:2160,format=nv12,hwupload=extra_hw_frames=64 -c:v h264_qsv -global_quality 23 -an -movflags +faststart -f mp4 /media/timelapse.inprogress.mp4");
}

// ============================================================================
// UNIT TESTS: individual rules
// ============================================================================

#[test]
fn test_external_subtitle_muxed_as_second_input() {
    let cfg = config(|_| {});
    let mut rec = record("/media/clip.mkv", AudioChannels::Count(2), false);
    rec.external_subtitle = Some(PathBuf::from("/media/clip.en.srt"));
    let cmd = args(&encode_plan(&cfg, &HardwareBackend::Cpu, &rec));

    assert_cmd_contains(&cmd, "-i /media/clip.mkv -i /media/clip.en.srt");
    assert_cmd_contains(&cmd, "-map 1:0");
    assert_cmd_contains(&cmd, "-c:s mov_text");
    assert_cmd_not_contains(&cmd, "0:s:");
}

#[test]
fn test_only_text_tracks_are_mapped() {
    let cfg = config(|_| {});
    let mut rec = record("/media/rip.mkv", AudioChannels::Count(2), false);
    // PGS, subrip, VobSub, ass
    rec.text_subtitles = vec![1, 3];
    let cmd = args(&encode_plan(&cfg, &HardwareBackend::Cpu, &rec));

    assert_cmd_contains(&cmd, "-map 0:s:1 -map 0:s:3 -vf");
    assert_cmd_not_contains(&cmd, "0:s:0");
    assert_cmd_not_contains(&cmd, "0:s:2");
    assert_cmd_contains(&cmd, "-c:s mov_text");
}

#[test]
fn test_unknown_channels_reencode_keeps_layout() {
    let cfg = config(|c| c.encode.audio_mode = AudioMode::Reencode);
    let rec = record("/media/clip.mkv", AudioChannels::Unknown, false);
    let cmd = args(&encode_plan(&cfg, &HardwareBackend::Cpu, &rec));

    assert_cmd_contains(&cmd, "-c:a aac -b:a 192k");
    assert_cmd_not_contains(&cmd, "-ac ");
}

#[test]
fn test_stereo_source_is_not_downmixed_again() {
    let cfg = config(|c| c.encode.audio_mode = AudioMode::Downmix);
    let rec = record("/media/clip.mkv", AudioChannels::Count(2), false);
    let cmd = args(&encode_plan(&cfg, &HardwareBackend::Cpu, &rec));

    assert_cmd_contains(&cmd, "-c:a aac -ac 2 -b:a 192k");
}

#[test]
fn test_h264_has_no_hvc1_tag() {
    let cfg = config(|c| c.encode.codec = VideoCodec::H264);
    let rec = record("/media/clip.mkv", AudioChannels::Count(2), false);
    let cmd = args(&encode_plan(&cfg, &HardwareBackend::Cpu, &rec));

    assert_cmd_contains(&cmd, "-c:v libx264 -crf 23");
    assert_cmd_not_contains(&cmd, "hvc1");
}

#[test]
fn test_quality_passes_through_unchanged_on_every_backend() {
    let cfg = config(|c| c.encode.quality = 31);
    let rec = record("/media/clip.mkv", AudioChannels::Count(2), false);

    for (backend, knob) in [
        (HardwareBackend::Cpu, "-crf 31"),
        (HardwareBackend::Nvenc, "-cq 31"),
        (qsv(), "-global_quality 31"),
        (vaapi(), "-qp 31"),
    ] {
        let cmd = args(&encode_plan(&cfg, &backend, &rec));
        assert_cmd_contains(&cmd, knob);
    }
}

#[test]
fn test_output_never_overwrites_temp() {
    let cfg = config(|_| {});
    let rec = record("/media/clip.mkv", AudioChannels::Count(2), false);
    let plan = encode_plan(&cfg, &HardwareBackend::Cpu, &rec);
    let cmd = build_ffmpeg_cmd(Path::new("/opt/ffmpeg/bin/ffmpeg"), &plan);
    let text = cmd_to_string(&cmd);

    assert!(text.starts_with("/opt/ffmpeg/bin/ffmpeg -hide_banner -nostdin -n "));
    assert!(text.ends_with("/media/clip.inprogress.mp4"));
    assert_cmd_not_contains(&text, " -y ");
}
