// Signals delivered to the vidopt binary itself

use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use vidopt::config::Config;

use crate::common::fake_tools::{FakeTools, lock};
use crate::common::helpers::*;

fn wait_with_deadline(child: &mut Child, deadline: Duration) -> Option<ExitStatus> {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if let Ok(Some(status)) = child.try_wait() {
            return Some(status);
        }
        thread::sleep(Duration::from_millis(50));
    }
    let _ = child.kill();
    let _ = child.wait();
    None
}

fn spawn_batch(tools: &FakeTools, target: &TempDir, config_dir: &TempDir) -> Child {
    let config_path = config_dir.path().join("config.toml");
    Config {
        tools: tools.tool_paths(),
        ..Config::default()
    }
    .save_to(&config_path)
    .unwrap();

    Command::new(env!("CARGO_BIN_EXE_vidopt"))
        .arg(target.path())
        .arg("--config")
        .arg(&config_path)
        .arg("--no-hw")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

fn assert_stops_cleanly_on(signal: libc::c_int) {
    let _lock = lock();
    let tools = FakeTools::install();
    let target = TempDir::new().unwrap();
    let config_dir = TempDir::new().unwrap();
    let input = target.path().join("movie_HANG_SRC.mkv");
    write_sized(&input, 5_000_000);
    let temp = target.path().join("movie_HANG_SRC.inprogress.mp4");

    let mut child = spawn_batch(&tools, &target, &config_dir);

    let start = Instant::now();
    while !temp.exists() && start.elapsed() < Duration::from_secs(10) {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(temp.exists(), "encoder never started writing");

    // SAFETY: the pid belongs to a child we have not reaped yet
    unsafe {
        libc::kill(child.id() as libc::pid_t, signal);
    }

    let status = wait_with_deadline(&mut child, Duration::from_secs(20))
        .expect("vidopt did not exit after the signal");
    assert_eq!(status.code(), Some(130));
    assert!(!temp.exists(), "partial output left behind");
    assert_eq!(std::fs::metadata(&input).unwrap().len(), 5_000_000);
    assert_eq!(dir_listing(target.path()), vec!["movie_HANG_SRC.mkv"]);
}

#[test]
fn test_sigterm_removes_partial_output_and_exits_130() {
    assert_stops_cleanly_on(libc::SIGTERM);
}

#[test]
fn test_sigint_removes_partial_output_and_exits_130() {
    assert_stops_cleanly_on(libc::SIGINT);
}
