//! Cancellation token and the in-flight temp file slot

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Exit status used when the user aborts (128 + SIGINT)
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Shared "stop now" flag, flipped by the signal handler
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Path of the temp output currently being written, if any
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<Mutex<Option<PathBuf>>>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<PathBuf>> {
        // A panic while holding the lock must not stop cleanup
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `temp` as in flight until the guard drops
    pub fn track(&self, temp: &Path) -> InFlightGuard {
        *self.slot() = Some(temp.to_path_buf());
        InFlightGuard {
            slot: self.clone(),
        }
    }

    pub fn current(&self) -> Option<PathBuf> {
        self.slot().clone()
    }

    /// Delete the in-flight temp, if one is recorded and still on disk
    pub fn discard(&self) {
        let taken = self.slot().take();
        if let Some(path) = taken {
            remove_if_exists(&path);
        }
    }
}

/// Clears the slot and removes any leftover temp on every exit path
#[must_use = "dropping the guard immediately releases the in-flight slot"]
pub struct InFlightGuard {
    slot: InFlight,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.slot.discard();
    }
}

pub fn remove_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed temp output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "failed to remove temp output: {}", e),
    }
}

/// Install the handler for Ctrl+C, SIGTERM and SIGHUP.
///
/// The first signal cancels the token so the running encode is stopped and
/// cleaned up. A second one deletes the in-flight temp and exits immediately.
pub fn install_handler(token: CancelToken, in_flight: InFlight) -> Result<()> {
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            eprintln!("\nForced exit");
            in_flight.discard();
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        eprintln!("\nInterrupt received, stopping current encode (Ctrl+C again to force)");
        token.cancel();
    })
    .context("Failed to install signal handler")
}
