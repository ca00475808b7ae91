//! Short-lived subprocess helpers

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run `cmd` to completion, capturing stdout/stderr.
///
/// Returns `None` when the program cannot be spawned or does not exit within
/// `timeout` (the child is killed and reaped). A non-zero exit still yields
/// `Some`; callers decide what a failed status means.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Option<Output> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let program = cmd.get_program().to_string_lossy().to_string();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            debug!(%program, "failed to spawn: {}", e);
            return None;
        }
    };

    // Drain both pipes so a chatty child never blocks on a full buffer
    let stdout_reader = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            buf
        })
    });
    let stderr_reader = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf);
            buf
        })
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                warn!(%program, timeout_secs = timeout.as_secs_f64(), "timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                debug!(%program, "wait failed: {}", e);
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    };

    let stdout = stdout_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    Some(Output {
        status,
        stdout,
        stderr,
    })
}
