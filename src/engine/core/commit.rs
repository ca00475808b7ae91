use super::types::{EncodeOutcome, EncodePlan, FileRecord, FileReport};
use crate::engine::cancel::remove_if_exists;
use std::fs;
use tracing::{info, warn};

/// Percentage saved, two decimals. `"0"` when the original was empty.
pub fn format_reduction(original: u64, final_size: u64) -> String {
    if original == 0 {
        return "0".to_string();
    }
    let saved = original as f64 - final_size as f64;
    format!("{:.2}%", saved * 100.0 / original as f64)
}

/// Promote the temp output to its final name, or clean up after a failure.
///
/// The original is only removed after the rename succeeded, and only when the
/// output landed under a different name.
pub fn commit(
    plan: &EncodePlan,
    record: &FileRecord,
    outcome: &EncodeOutcome,
    overwrite: bool,
) -> FileReport {
    let input = &record.input_path;

    let (output_bytes, avg_fps) = match outcome {
        EncodeOutcome::Success {
            output_bytes,
            avg_fps,
        } => (*output_bytes, *avg_fps),
        EncodeOutcome::Failure { reason } => {
            remove_if_exists(&plan.temp_path);
            return FileReport::failed(input, record.original_size, reason.clone());
        }
    };

    if let Err(e) = fs::rename(&plan.temp_path, &plan.final_path) {
        warn!(
            temp = %plan.temp_path.display(),
            target = %plan.final_path.display(),
            "rename failed: {}",
            e
        );
        remove_if_exists(&plan.temp_path);
        return FileReport::failed(
            input,
            record.original_size,
            format!("could not move output into place: {e}"),
        );
    }

    if overwrite && plan.final_path != *input {
        if let Err(e) = fs::remove_file(input) {
            warn!(path = %input.display(), "could not remove original: {}", e);
        }
    }

    // Prefer the on-disk size; the outcome's count is from before the rename
    let final_size = fs::metadata(&plan.final_path)
        .map(|m| m.len())
        .unwrap_or(output_bytes);
    let reduction = format_reduction(record.original_size, final_size);
    info!(
        output = %plan.final_path.display(),
        original = record.original_size,
        final_size,
        %reduction,
        "committed"
    );

    FileReport::ok(input, record.original_size, final_size, reduction, avg_fps)
}
