// End-to-end runs against fake encoder/prober scripts

use std::fs;
use tempfile::TempDir;
use vidopt::config::{AudioMode, RunConfig};
use vidopt::engine::{CancelToken, HardwareBackend, InFlight, JobStatus, RunCoordinator};
use vidopt::report::JsonReport;

use crate::common::fake_tools::{ENCODED_BYTES, FakeTools, lock};
use crate::common::helpers::*;

fn run(config: &RunConfig) -> CollectingSink {
    let mut sink = CollectingSink::default();
    RunCoordinator::new(config, HardwareBackend::Cpu, CancelToken::new(), InFlight::new())
        .quiet()
        .run(&mut sink)
        .expect("run should complete");
    sink
}

#[test]
fn test_surround_source_downmixed_and_committed() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("movie_SURROUND.mkv"), 5_000_000);

    let config = run_config(target.path(), tools.tool_paths(), |c| {
        c.encode.audio_mode = AudioMode::Downmix;
    });
    let sink = run(&config);

    let report = sink.report_for("movie_SURROUND.mkv");
    assert_eq!(report.status, JobStatus::Ok);
    assert_eq!(report.original_size_bytes, 5_000_000);
    assert_eq!(report.final_size_bytes, Some(ENCODED_BYTES));
    assert_eq!(report.reduction_percent.as_deref(), Some("40.00%"));
    assert_eq!(report.avg_fps, Some(61.5));

    assert_eq!(
        dir_listing(target.path()),
        vec!["movie_SURROUND-optimized.mp4", "movie_SURROUND.mkv"]
    );

    let calls = tools.ffmpeg_call_strings();
    assert_eq!(calls.len(), 1);
    assert_cmd_contains(&calls[0], "-c:a aac -ac 2 -b:a 192k");

    let summary = sink.summary.expect("summary delivered");
    assert_eq!(summary.total_files_seen, 1);
    assert_eq!(summary.total_files_processed, 1);
    assert_eq!(summary.total_bytes_saved, 2_000_000);
}

#[test]
fn test_audio_first_stream_is_invalid_and_never_encoded() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("podcast_AUDIO_ONLY.mkv"), 1000);

    let config = run_config(target.path(), tools.tool_paths(), |_| {});
    let sink = run(&config);

    let report = sink.report_for("podcast_AUDIO_ONLY.mkv");
    assert_eq!(report.status, JobStatus::Invalid);
    assert_eq!(report.final_size_bytes, None);
    assert!(tools.ffmpeg_calls().is_empty());

    let summary = sink.summary.unwrap();
    assert_eq!(summary.invalid, 1);
    assert_eq!(summary.total_files_processed, 0);
}

#[test]
fn test_encoder_failure_is_contained() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("a_BROKEN_SRC.mkv"), 1000);
    write_sized(&target.path().join("b_good.mkv"), 5_000_000);
    write_sized(&target.path().join("c_EMPTY_OUT.mkv"), 1000);

    let config = run_config(target.path(), tools.tool_paths(), |c| {
        c.behavior.overwrite = true;
    });
    let sink = run(&config);

    let broken = sink.report_for("a_BROKEN_SRC.mkv");
    assert_eq!(broken.status, JobStatus::Failed);
    assert!(broken.detail.as_deref().unwrap().contains("Conversion failed!"));
    assert_eq!(sink.report_for("b_good.mkv").status, JobStatus::Ok);
    assert_eq!(sink.report_for("c_EMPTY_OUT.mkv").status, JobStatus::Failed);

    // Failed originals untouched, no temp files anywhere
    assert_eq!(
        dir_listing(target.path()),
        vec!["a_BROKEN_SRC.mkv", "b_good.mp4", "c_EMPTY_OUT.mkv"]
    );

    let summary = sink.summary.unwrap();
    assert_eq!(summary.total_files_seen, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.total_files_processed, 1);
}

#[test]
fn test_overwrite_mode_reprocesses_on_rerun() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("episode.mkv"), 5_000_000);

    let config = run_config(target.path(), tools.tool_paths(), |c| {
        c.behavior.overwrite = true;
    });

    let first = run(&config);
    assert_eq!(first.report_for("episode.mkv").status, JobStatus::Ok);
    assert_eq!(dir_listing(target.path()), vec!["episode.mp4"]);

    let second = run(&config);
    let report = second.report_for("episode.mp4");
    assert_eq!(report.status, JobStatus::Ok);
    assert_eq!(report.reduction_percent.as_deref(), Some("0.00%"));
    assert_eq!(dir_listing(target.path()), vec!["episode.mp4"]);
    assert_eq!(tools.ffmpeg_calls().len(), 2);
}

#[test]
fn test_keep_mode_skips_on_rerun() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("episode.mkv"), 5_000_000);

    let config = run_config(target.path(), tools.tool_paths(), |_| {});

    assert_eq!(run(&config).report_for("episode.mkv").status, JobStatus::Ok);
    let second = run(&config);
    let report = second.report_for("episode.mkv");
    assert_eq!(report.status, JobStatus::Skipped);
    assert_eq!(second.files.len(), 1, "optimized output must not be rescanned");
    assert_eq!(tools.ffmpeg_calls().len(), 1);
}

#[test]
fn test_overwrite_never_clobbers_sibling_mp4() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("clip.mkv"), 5_000_000);
    write_sized(&target.path().join("clip.mp4"), 4_000_000);

    let config = run_config(target.path(), tools.tool_paths(), |c| {
        c.behavior.overwrite = true;
    });
    let sink = run(&config);

    assert_eq!(sink.report_for("clip.mkv").status, JobStatus::Skipped);
    assert_eq!(sink.report_for("clip.mp4").status, JobStatus::Ok);
    assert!(target.path().join("clip.mkv").exists());
    assert_eq!(
        fs::metadata(target.path().join("clip.mp4")).unwrap().len(),
        ENCODED_BYTES
    );
}

#[test]
fn test_stale_temp_is_replaced() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("clip.mkv"), 5_000_000);
    write_sized(&target.path().join("clip.inprogress.mp4"), 10);

    let config = run_config(target.path(), tools.tool_paths(), |_| {});
    let sink = run(&config);

    assert_eq!(sink.files.len(), 1);
    assert_eq!(sink.report_for("clip.mkv").status, JobStatus::Ok);
    assert_eq!(
        dir_listing(target.path()),
        vec!["clip-optimized.mp4", "clip.mkv"]
    );
}

#[test]
fn test_hung_probe_marks_file_invalid() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("x_HANG_PROBE.mkv"), 1000);

    let mut paths = tools.tool_paths();
    paths.probe_timeout_secs = 1;
    let config = run_config(target.path(), paths, |_| {});

    let started = std::time::Instant::now();
    let sink = run(&config);
    assert_eq!(sink.report_for("x_HANG_PROBE.mkv").status, JobStatus::Invalid);
    assert!(started.elapsed() < std::time::Duration::from_secs(8));
}

#[test]
fn test_fetched_subtitles_are_muxed() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("film.mkv"), 5_000_000);
    write_sized(&target.path().join("other_WITH_SUBS.mkv"), 5_000_000);

    let config = run_config(target.path(), tools.tool_paths(), |c| {
        c.behavior.fetch_subtitles = true;
    });
    let sink = run(&config);
    assert_eq!(sink.report_for("film.mkv").status, JobStatus::Ok);

    let calls = tools.ffmpeg_call_strings();
    assert_eq!(calls.len(), 2);
    let film = calls.iter().find(|c| c.contains("film.mkv")).unwrap();
    assert_cmd_contains(film, "film.en.srt");
    assert_cmd_contains(film, "-map 1:0");
    let embedded = calls.iter().find(|c| c.contains("other_WITH_SUBS")).unwrap();
    assert_cmd_contains(embedded, "-map 0:s:0");
    assert_cmd_not_contains(embedded, ".srt");
}

#[test]
fn test_bitmap_subtitles_are_dropped_not_fatal() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("a_PGS_SUBS.mkv"), 5_000_000);
    write_sized(&target.path().join("b_MIXED_SUBS.mkv"), 5_000_000);

    let config = run_config(target.path(), tools.tool_paths(), |_| {});
    let sink = run(&config);
    assert_eq!(sink.report_for("a_PGS_SUBS.mkv").status, JobStatus::Ok);
    assert_eq!(sink.report_for("b_MIXED_SUBS.mkv").status, JobStatus::Ok);

    let calls = tools.ffmpeg_call_strings();
    assert_eq!(calls.len(), 2);
    assert_cmd_not_contains(&calls[0], "-map 0:s");
    assert_cmd_not_contains(&calls[0], "mov_text");
    assert_cmd_contains(&calls[1], "-map 0:s:1 -vf");
    assert_cmd_not_contains(&calls[1], "0:s:0");
}

#[test]
fn test_bitmap_only_source_gets_fetched_sidecar() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("rip_PGS_SUBS.mkv"), 5_000_000);

    let config = run_config(target.path(), tools.tool_paths(), |c| {
        c.behavior.fetch_subtitles = true;
    });
    let sink = run(&config);
    assert_eq!(sink.report_for("rip_PGS_SUBS.mkv").status, JobStatus::Ok);

    let calls = tools.ffmpeg_call_strings();
    assert_cmd_contains(&calls[0], "rip_PGS_SUBS.en.srt");
    assert_cmd_contains(&calls[0], "-map 1:0");
}

#[test]
fn test_keep_mode_rerun_does_not_fetch_subtitles() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("episode.mkv"), 5_000_000);
    write_sized(&target.path().join("episode-optimized.mp4"), 3_000_000);

    let config = run_config(target.path(), tools.tool_paths(), |c| {
        c.behavior.fetch_subtitles = true;
    });
    let sink = run(&config);

    assert_eq!(sink.report_for("episode.mkv").status, JobStatus::Skipped);
    assert!(tools.fetch_calls().is_empty());
    assert_eq!(
        dir_listing(target.path()),
        vec!["episode-optimized.mp4", "episode.mkv"]
    );
}

#[test]
fn test_json_report_written_to_target() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("movie_SURROUND.mkv"), 5_000_000);
    write_sized(&target.path().join("notes_AUDIO_ONLY.mov"), 100);

    let config = run_config(target.path(), tools.tool_paths(), |_| {});
    let mut report = JsonReport::new(target.path());
    let summary = RunCoordinator::new(&config, HardwareBackend::Cpu, CancelToken::new(), InFlight::new())
        .quiet()
        .run(&mut report)
        .unwrap();

    let path = report.written_path().expect("report written").to_path_buf();
    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(doc["summary"]["run_id"], summary.run_id.to_string());
    assert_eq!(doc["summary"]["total_files_seen"], 2);
    assert_eq!(doc["files"][0]["status"], "OK");
    assert_eq!(doc["files"][0]["reduction_percent"], "40.00%");
    assert_eq!(doc["files"][1]["status"], "Invalid");
    assert_eq!(doc["files"][1]["avg_fps"], "unknown");
}

#[test]
fn test_preview_touches_nothing() {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    write_sized(&target.path().join("a.mkv"), 1000);
    write_sized(&target.path().join("b_AUDIO_ONLY.mkv"), 1000);

    let config = run_config(target.path(), tools.tool_paths(), |_| {});
    let previews = RunCoordinator::new(&config, HardwareBackend::Cpu, CancelToken::new(), InFlight::new())
        .quiet()
        .preview()
        .unwrap();

    assert_eq!(previews.len(), 2);
    match &previews[0].1 {
        vidopt::engine::coordinator::Preview::Encode {
            command,
            output_width,
        } => {
            assert!(command.contains("libx265"));
            assert_eq!(*output_width, Some(1920));
        }
        other => panic!("expected encode preview, got {:?}", other),
    }
    assert_eq!(
        previews[1].1,
        vidopt::engine::coordinator::Preview::Invalid
    );
    assert!(tools.ffmpeg_calls().is_empty());
    assert_eq!(dir_listing(target.path()), vec!["a.mkv", "b_AUDIO_ONLY.mkv"]);
}
