//! Hardware encoding backend detection

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ToolPaths;
use crate::engine::process::run_with_timeout;

/// PCI vendor id reported by Intel GPUs in sysfs
pub const INTEL_VENDOR_ID: &str = "0x8086";

const DRI_DIR: &str = "/dev/dri";
const DRM_SYSFS_DIR: &str = "/sys/class/drm";
const NVIDIA_DEVICE_NODES: &[&str] = &["/dev/nvidia0", "/dev/nvidiactl"];
const HOST_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// Backend Selection
// ============================================================================

/// Encoding backend chosen once per run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum HardwareBackend {
    #[default]
    Cpu,
    Nvenc,
    QuickSync {
        device: PathBuf,
    },
    Vaapi {
        device: PathBuf,
    },
}

impl HardwareBackend {
    /// Render node the backend encodes on (QuickSync and VAAPI only)
    pub fn device(&self) -> Option<&Path> {
        match self {
            Self::Cpu | Self::Nvenc => None,
            Self::QuickSync { device } | Self::Vaapi { device } => Some(device),
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::Cpu)
    }

    /// Get user-friendly display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU (software)",
            Self::Nvenc => "NVENC (NVIDIA)",
            Self::QuickSync { .. } => "Quick Sync (Intel)",
            Self::Vaapi { .. } => "VAAPI",
        }
    }
}

impl fmt::Display for HardwareBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.device() {
            Some(device) => write!(f, "{} on {}", self.display_name(), device.display()),
            None => f.write_str(self.display_name()),
        }
    }
}

/// A `/dev/dri/renderD*` node and the PCI vendor behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderDevice {
    pub path: PathBuf,
    pub vendor: Option<String>,
}

impl RenderDevice {
    pub fn is_intel(&self) -> bool {
        self.vendor.as_deref() == Some(INTEL_VENDOR_ID)
    }
}

/// Everything the selection policy looks at
#[derive(Debug, Clone, Default)]
pub struct HostSignals {
    /// Encoder names compiled into ffmpeg
    pub encoders: Vec<String>,
    /// NVIDIA device node present or nvidia-smi reachable
    pub nvidia_device: bool,
    /// Render nodes in lexical order
    pub render_devices: Vec<RenderDevice>,
}

impl HostSignals {
    /// Query the host. Every failure reads as "signal absent".
    pub fn gather(tools: &ToolPaths) -> Self {
        let signals = Self {
            encoders: ffmpeg_encoder_names(&tools.ffmpeg),
            nvidia_device: has_nvidia_device(),
            render_devices: list_render_devices(Path::new(DRI_DIR), Path::new(DRM_SYSFS_DIR)),
        };
        debug!(
            encoders = signals.encoders.len(),
            nvidia = signals.nvidia_device,
            render_nodes = signals.render_devices.len(),
            "gathered hardware signals"
        );
        signals
    }

    /// True if any compiled encoder name ends with `suffix` (e.g. `_nvenc`)
    pub fn has_encoder_family(&self, suffix: &str) -> bool {
        self.encoders.iter().any(|name| name.ends_with(suffix))
    }
}

/// Pick a backend from gathered signals.
///
/// Priority: NVENC, then Quick Sync on an Intel render node, then generic
/// VAAPI on the first render node, then CPU.
pub fn select_backend(signals: &HostSignals) -> HardwareBackend {
    if signals.has_encoder_family("_nvenc") && signals.nvidia_device {
        return HardwareBackend::Nvenc;
    }

    // Vendor filtering keeps AMD-only hosts off the QSV path
    if signals.has_encoder_family("_qsv") {
        if let Some(intel) = signals.render_devices.iter().find(|d| d.is_intel()) {
            return HardwareBackend::QuickSync {
                device: intel.path.clone(),
            };
        }
    }

    if signals.has_encoder_family("_vaapi") {
        if let Some(first) = signals.render_devices.first() {
            return HardwareBackend::Vaapi {
                device: first.path.clone(),
            };
        }
    }

    HardwareBackend::Cpu
}

/// Detect the backend for this run. Never fails; degrades to CPU.
pub fn detect(disable_hardware: bool, tools: &ToolPaths) -> HardwareBackend {
    if disable_hardware {
        info!("hardware encoding disabled, using CPU");
        return HardwareBackend::Cpu;
    }

    let backend = select_backend(&HostSignals::gather(tools));
    info!(backend = %backend, "selected encoding backend");
    backend
}

// ============================================================================
// Host Queries
// ============================================================================

/// Extract encoder names from `ffmpeg -encoders` output.
///
/// Listing lines look like ` V....D h264_nvenc   NVIDIA NVENC H.264 encoder`;
/// everything above the `------` separator is legend.
pub fn parse_encoder_names(output: &str) -> Vec<String> {
    let mut lines = output.lines();
    let has_separator = output.lines().any(|l| l.trim_start().starts_with("---"));
    if has_separator {
        for line in lines.by_ref() {
            if line.trim_start().starts_with("---") {
                break;
            }
        }
    }

    lines
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            if flags.len() == 6 && name != "=" {
                Some(name.to_string())
            } else {
                None
            }
        })
        .collect()
}

fn ffmpeg_encoder_names(ffmpeg: &Path) -> Vec<String> {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-encoders"]);

    match run_with_timeout(cmd, HOST_QUERY_TIMEOUT) {
        Some(output) if output.status.success() => {
            parse_encoder_names(&String::from_utf8_lossy(&output.stdout))
        }
        _ => {
            debug!("could not list ffmpeg encoders");
            Vec::new()
        }
    }
}

/// Detect NVIDIA GPU using nvidia-smi
pub fn detect_nvidia_gpu() -> Option<String> {
    let mut cmd = Command::new("nvidia-smi");
    cmd.args(["--query-gpu=name", "--format=csv,noheader"]);
    let output = run_with_timeout(cmd, HOST_QUERY_TIMEOUT)?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let name = stdout.lines().next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// NVIDIA device node present, or the management utility answers
pub fn has_nvidia_device() -> bool {
    NVIDIA_DEVICE_NODES.iter().any(|node| Path::new(node).exists())
        || detect_nvidia_gpu().is_some()
}

/// List `renderD*` nodes under `dri_dir`, sorted, with vendor ids read from
/// `<sysfs_dir>/<node>/device/vendor`
pub fn list_render_devices(dri_dir: &Path, sysfs_dir: &Path) -> Vec<RenderDevice> {
    let Ok(entries) = std::fs::read_dir(dri_dir) else {
        return Vec::new();
    };

    let mut nodes: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| name.starts_with("renderD"))
        .collect();

    // renderD128 before renderD129, etc.
    nodes.sort();

    nodes
        .into_iter()
        .map(|name| {
            let vendor = std::fs::read_to_string(sysfs_dir.join(&name).join("device/vendor"))
                .ok()
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty());
            RenderDevice {
                path: dri_dir.join(&name),
                vendor,
            }
        })
        .collect()
}
