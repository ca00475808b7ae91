use std::path::PathBuf;
use thiserror::Error;

/// Conditions that end a batch run early
#[derive(Debug, Error)]
pub enum RunError {
    /// Target directory missing or not a directory; nothing was touched.
    #[error("target directory {0} does not exist or is not a directory")]
    TargetMissing(PathBuf),

    /// Target directory exists but cannot be listed.
    #[error("cannot read target directory {path}: {source}")]
    TargetUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// User cancelled; files committed before this point stay committed.
    #[error("run interrupted while processing {file}")]
    Interrupted { file: PathBuf },
}

/// Raised by the encoder invocation boundary. Everything else becomes an outcome.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error("encode interrupted by user")]
    Interrupted,
}
