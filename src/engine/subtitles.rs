//! Best-effort subtitle download through an external fetcher

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ToolPaths;
use crate::engine::process::run_with_timeout;

#[derive(Debug, Clone)]
pub struct SubtitleFetcher {
    program: PathBuf,
    language: String,
    timeout: Duration,
}

impl SubtitleFetcher {
    pub fn new(tools: &ToolPaths, language: &str) -> Self {
        Self {
            program: tools.subtitle_fetcher.clone(),
            language: language.to_string(),
            timeout: tools.subtitle_timeout(),
        }
    }

    /// Run `<fetcher> download -l <lang> <path>` and return the sidecar it left
    /// behind. Any failure is logged and yields `None`.
    pub fn fetch(&self, video: &Path) -> Option<PathBuf> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["download", "-l", &self.language]);
        cmd.arg(video);

        match run_with_timeout(cmd, self.timeout) {
            Some(output) if output.status.success() => {}
            Some(output) => {
                warn!(
                    path = %video.display(),
                    status = %output.status,
                    "subtitle fetch failed, continuing without"
                );
                return None;
            }
            None => {
                warn!(path = %video.display(), "subtitle fetcher unavailable or timed out");
                return None;
            }
        }

        let sidecar = find_sidecar(video, &self.language);
        match &sidecar {
            Some(path) => info!(subtitle = %path.display(), "fetched subtitles"),
            None => debug!(path = %video.display(), "fetcher produced no sidecar"),
        }
        sidecar
    }
}

/// Look for `<stem>.<lang>.srt`, then `<stem>.srt`, next to `video`
pub fn find_sidecar(video: &Path, language: &str) -> Option<PathBuf> {
    let stem = video.file_stem()?.to_string_lossy();
    let dir = video.parent().unwrap_or_else(|| Path::new(""));

    [format!("{stem}.{language}.srt"), format!("{stem}.srt")]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}
