use super::types::{AudioPlan, EncodeOutcome, EncodePlan, ProgressParser, SubtitlePlan};
use crate::engine::cancel::{CancelToken, remove_if_exists};
use crate::error::InvokeError;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long ffmpeg gets to finish after SIGTERM before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(5);
/// Bound on draining buffered progress once the encoder has exited
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const STDERR_TAIL_LINES: usize = 20;

/// Check if FFmpeg was cancelled by user signal (SIGTERM, SIGINT, SIGQUIT)
///
/// FFmpeg catches signals and exits gracefully, printing "Exiting normally, received signal X"
/// So we check both the process signal status AND the stderr for this message.
#[cfg(unix)]
fn was_user_cancelled(status: &ExitStatus, stderr: &str) -> bool {
    use std::os::unix::process::ExitStatusExt;

    // Killed outright (rare - FFmpeg usually catches signals)
    if let Some(signal) = status.signal() {
        if matches!(signal, 2 | 3 | 15) {
            return true;
        }
    }

    stderr.contains("received signal 2")
        || stderr.contains("received signal 3")
        || stderr.contains("received signal 15")
}

#[cfg(not(unix))]
fn was_user_cancelled(_status: &ExitStatus, stderr: &str) -> bool {
    stderr.contains("received signal")
}

fn apply_audio(cmd: &mut Command, audio: &AudioPlan) {
    match audio {
        AudioPlan::Drop => {
            cmd.arg("-an");
        }
        AudioPlan::Copy => {
            cmd.args(["-c:a", "copy"]);
        }
        AudioPlan::Downmix { bitrate_k } => {
            cmd.args(["-c:a", "aac", "-ac", "2"]);
            cmd.arg("-b:a").arg(format!("{bitrate_k}k"));
        }
        AudioPlan::Reencode {
            channels,
            bitrate_k,
        } => {
            cmd.args(["-c:a", "aac"]);
            if let Some(n) = channels {
                cmd.arg("-ac").arg(n.to_string());
            }
            cmd.arg("-b:a").arg(format!("{bitrate_k}k"));
        }
    }
}

/// Build the ffmpeg invocation for a plan.
/// Returns the command but does not execute it
pub fn build_ffmpeg_cmd(ffmpeg: &Path, plan: &EncodePlan) -> Command {
    let mut cmd = Command::new(ffmpeg);

    // Never prompt, never overwrite: a leftover temp must fail loudly
    cmd.args(["-hide_banner", "-nostdin", "-n"]);
    cmd.args(&plan.hw_init);

    cmd.arg("-i").arg(&plan.input_path);
    if let SubtitlePlan::External(sidecar) = &plan.subtitles {
        cmd.arg("-i").arg(sidecar);
    }

    cmd.args(["-progress", "pipe:1", "-nostats"]);

    cmd.args(["-map", "0:v:0"]);
    if plan.audio != AudioPlan::Drop {
        cmd.args(["-map", "0:a:0"]);
    }
    match &plan.subtitles {
        SubtitlePlan::None => {}
        SubtitlePlan::Embedded(tracks) => {
            for track in tracks {
                cmd.arg("-map").arg(format!("0:s:{track}"));
            }
        }
        SubtitlePlan::External(_) => {
            cmd.args(["-map", "1:0"]);
        }
    }

    cmd.arg("-vf").arg(&plan.filter_chain);
    cmd.arg("-c:v").arg(plan.encoder);
    if let Some(tag) = plan.video_tag {
        cmd.arg("-tag:v").arg(tag);
    }
    cmd.args(plan.quality.rate_control);
    cmd.arg(plan.quality.flag)
        .arg(plan.quality.value.to_string());

    apply_audio(&mut cmd, &plan.audio);

    if plan.subtitles != SubtitlePlan::None {
        cmd.args(["-c:s", "mov_text"]);
    }

    cmd.args(["-movflags", "+faststart", "-f", "mp4"]);
    cmd.arg(&plan.temp_path);
    cmd
}

/// Format a command as a shell-safe string for display
pub fn format_ffmpeg_cmd(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|arg| {
            let s = arg.to_string_lossy();
            shlex::try_quote(&s)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| format!("{s:?}"))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn tail(lines: &VecDeque<String>) -> String {
    lines.iter().cloned().collect::<Vec<_>>().join("\n")
}

/// Ask the encoder to stop, escalate to SIGKILL after the grace period, reap it
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: pid belongs to a child we have not yet reaped
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(_) => break,
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Run the encoder for one plan, reporting progress as it arrives.
///
/// Every ordinary failure comes back as `EncodeOutcome::Failure` with the temp
/// output removed. Only user cancellation is an error.
pub fn invoke<F>(
    ffmpeg: &Path,
    plan: &EncodePlan,
    cancel: &CancelToken,
    mut on_progress: F,
) -> Result<EncodeOutcome, InvokeError>
where
    F: FnMut(&ProgressParser),
{
    let mut cmd = build_ffmpeg_cmd(ffmpeg, plan);
    debug!(command = %format_ffmpeg_cmd(&cmd), "starting encode");

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Ok(EncodeOutcome::Failure {
                reason: format!("failed to start {}: {}", ffmpeg.display(), e),
            });
        }
    };

    let (tx, rx) = mpsc::channel::<String>();
    if let Some(stdout) = child.stdout.take() {
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    let stderr_thread = child.stderr.take().map(|stderr| {
        thread::spawn(move || {
            let mut lines = VecDeque::with_capacity(STDERR_TAIL_LINES);
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if lines.len() == STDERR_TAIL_LINES {
                    lines.pop_front();
                }
                lines.push_back(line);
            }
            tail(&lines)
        })
    });

    let mut parser = ProgressParser::new();
    let mut handle_line = |line: &str, parser: &mut ProgressParser| {
        parser.parse_line(line);
        if line.starts_with("progress=") {
            on_progress(&*parser);
        }
    };

    let status = loop {
        if cancel.is_cancelled() {
            info!(input = %plan.input_path.display(), "cancelling encode");
            terminate(&mut child);
            remove_if_exists(&plan.temp_path);
            return Err(InvokeError::Interrupted);
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                handle_line(&line, &mut parser);
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
            // stdout closed; keep polling the exit status
            Err(RecvTimeoutError::Disconnected) => thread::sleep(POLL_INTERVAL),
        }

        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                remove_if_exists(&plan.temp_path);
                return Ok(EncodeOutcome::Failure {
                    reason: format!("failed to wait for ffmpeg: {e}"),
                });
            }
        }
    };

    // Pick up progress written just before exit
    while let Ok(line) = rx.recv_timeout(DRAIN_TIMEOUT) {
        handle_line(&line, &mut parser);
    }

    let stderr_tail = stderr_thread
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    if !status.success() {
        remove_if_exists(&plan.temp_path);
        if cancel.is_cancelled() || was_user_cancelled(&status, &stderr_tail) {
            return Err(InvokeError::Interrupted);
        }
        warn!(input = %plan.input_path.display(), %status, "encoder failed");
        let reason = match stderr_tail.lines().last() {
            Some(last) => format!("ffmpeg exited with {status}: {last}"),
            None => format!("ffmpeg exited with {status}"),
        };
        debug!(stderr = %stderr_tail, "encoder stderr tail");
        return Ok(EncodeOutcome::Failure { reason });
    }

    let output_bytes = std::fs::metadata(&plan.temp_path)
        .map(|m| m.len())
        .unwrap_or(0);
    if output_bytes == 0 {
        remove_if_exists(&plan.temp_path);
        return Ok(EncodeOutcome::Failure {
            reason: "encoder exited cleanly but produced no output".to_string(),
        });
    }

    Ok(EncodeOutcome::Success {
        output_bytes,
        avg_fps: parser.fps,
    })
}
