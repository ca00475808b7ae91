use crate::engine::process::run_with_timeout;
use anyhow::Result;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

fn tool_version(program: &Path, name: &str) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.arg("-version");

    let Some(output) = run_with_timeout(cmd, VERSION_TIMEOUT) else {
        anyhow::bail!(
            "Failed to execute {} ({}). Is {} installed and in PATH?",
            name,
            program.display(),
            name
        );
    };

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", name, output.status);
    }

    Ok(first_line(&String::from_utf8_lossy(&output.stdout)))
}

fn first_line(output: &str) -> String {
    output
        .lines()
        .next()
        .unwrap_or("Unknown version")
        .to_string()
}

/// Check if ffmpeg is available and return its version
pub fn ffmpeg_version(ffmpeg: &Path) -> Result<String> {
    tool_version(ffmpeg, "ffmpeg")
}

/// Check if ffprobe is available and return its version
pub fn ffprobe_version(ffprobe: &Path) -> Result<String> {
    tool_version(ffprobe, "ffprobe")
}
