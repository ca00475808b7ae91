use super::plan::{OPTIMIZED_MARKER, TEMP_MARKER};
use crate::error::RunError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use tracing::debug;

/// Video file extensions to scan for
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi"];

/// Check if a path has a video file extension
pub fn is_video_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        if let Some(ext_str) = ext.to_str() {
            return VIDEO_EXTENSIONS.contains(&ext_str.to_lowercase().as_str());
        }
    }
    false
}

/// Our own outputs: temp files and kept optimized copies
pub fn is_generated_output(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| {
            let stem = stem.to_string_lossy();
            stem.ends_with(TEMP_MARKER) || stem.ends_with(OPTIMIZED_MARKER)
        })
        .unwrap_or(false)
}

/// Walk `root` and invoke a callback for each candidate, in file-name order
pub fn scan_streaming<F>(root: &Path, recursive: bool, mut on_file: F) -> Result<(), RunError>
where
    F: FnMut(PathBuf),
{
    if !root.is_dir() {
        return Err(RunError::TargetMissing(root.to_path_buf()));
    }
    // Surface permission problems on the root itself instead of an empty run
    std::fs::read_dir(root).map_err(|source| RunError::TargetUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    for entry in walker.into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_file() && is_video_file(path) && !is_generated_output(path) {
            on_file(path.to_path_buf());
        }
    }

    Ok(())
}

/// Collect candidate video files under `root`
pub fn scan(root: &Path, recursive: bool) -> Result<Vec<PathBuf>, RunError> {
    let mut files = Vec::new();
    scan_streaming(root, recursive, |path| files.push(path))?;
    Ok(files)
}
