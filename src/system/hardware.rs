//! Hardware encoder discovery.
//!
//! The encoder binary is asked for its compiled-in encoders and its hardware
//! acceleration backends; [`classify_capabilities`] is the only place that reads that
//! free text. Everything downstream works from the resulting [`CapabilitySnapshot`].

use crate::config::ProbeConfig;
use crate::error::{ConversionError, Result};
use crate::system::probe::run_bounded;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const SOFTWARE_H264_ENCODER: &str = "libx264";
pub const SOFTWARE_HEVC_ENCODER: &str = "libx265";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareType {
    #[default]
    None,
    Videotoolbox,
    Nvenc,
    Amf,
    Qsv,
    Vaapi,
}

impl std::fmt::Display for HardwareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareType::None => write!(f, "CPU (Software Encoding)"),
            HardwareType::Videotoolbox => write!(f, "Apple (VideoToolbox)"),
            HardwareType::Nvenc => write!(f, "NVIDIA (NVENC)"),
            HardwareType::Amf => write!(f, "AMD (AMF)"),
            HardwareType::Qsv => write!(f, "Intel (QSV)"),
            HardwareType::Vaapi => write!(f, "VAAPI"),
        }
    }
}

impl HardwareType {
    /// Suffix used in ffmpeg encoder names, e.g. `nvenc` in `h264_nvenc`.
    pub fn encoder_suffix(&self) -> Option<&'static str> {
        match self {
            HardwareType::None => None,
            HardwareType::Videotoolbox => Some("videotoolbox"),
            HardwareType::Nvenc => Some("nvenc"),
            HardwareType::Amf => Some("amf"),
            HardwareType::Qsv => Some("qsv"),
            HardwareType::Vaapi => Some("vaapi"),
        }
    }

    /// Acceleration backends (as listed by `-hwaccels`) that make this family usable.
    fn backends(&self) -> &'static [&'static str] {
        match self {
            HardwareType::None => &[],
            HardwareType::Videotoolbox => &["videotoolbox"],
            HardwareType::Nvenc => &["cuda"],
            HardwareType::Amf => &["amf", "d3d11va"],
            HardwareType::Qsv => &["qsv"],
            HardwareType::Vaapi => &["vaapi"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    OtherUnix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::OtherUnix
        }
    }

    /// Hardware families worth checking on this platform, highest priority first.
    pub fn candidates(&self) -> &'static [HardwareType] {
        match self {
            Platform::MacOs => &[HardwareType::Videotoolbox],
            Platform::Windows => &[HardwareType::Nvenc, HardwareType::Amf, HardwareType::Qsv],
            Platform::OtherUnix => &[HardwareType::Vaapi, HardwareType::Nvenc],
        }
    }
}

/// Result of interpreting the raw probe output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Detected {
        hardware: HardwareType,
        encoders: Vec<String>,
        decoders: Vec<String>,
    },
    ProbeError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub platform: String,
    pub arch: String,
    pub has_gpu: bool,
    #[serde(rename = "type")]
    pub hardware_type: HardwareType,
    pub encoders: Vec<String>,
    pub decoders: Vec<String>,
    pub description: Option<String>,
    pub error: Option<String>,
}

impl CapabilitySnapshot {
    pub fn from_classification(platform: &str, arch: &str, classification: Classification) -> Self {
        match classification {
            Classification::Detected {
                hardware,
                encoders,
                decoders,
            } => Self {
                platform: platform.to_string(),
                arch: arch.to_string(),
                has_gpu: hardware != HardwareType::None,
                hardware_type: hardware,
                encoders,
                decoders,
                description: Some(hardware.to_string()),
                error: None,
            },
            Classification::ProbeError(error) => Self {
                error: Some(error),
                ..Self::software(platform, arch)
            },
        }
    }

    /// Snapshot describing a host with no usable hardware encoder.
    pub fn software(platform: &str, arch: &str) -> Self {
        Self {
            platform: platform.to_string(),
            arch: arch.to_string(),
            has_gpu: false,
            hardware_type: HardwareType::None,
            encoders: Vec::new(),
            decoders: Vec::new(),
            description: Some(HardwareType::None.to_string()),
            error: None,
        }
    }

    pub fn h264_encoder(&self) -> String {
        self.family_encoder("h264", SOFTWARE_H264_ENCODER)
    }

    pub fn hevc_encoder(&self) -> String {
        self.family_encoder("hevc", SOFTWARE_HEVC_ENCODER)
    }

    fn family_encoder(&self, codec: &str, software: &str) -> String {
        if !self.has_gpu {
            return software.to_string();
        }
        match self.hardware_type.encoder_suffix() {
            Some(suffix) => {
                let name = format!("{codec}_{suffix}");
                if self.encoders.iter().any(|e| *e == name) {
                    name
                } else {
                    software.to_string()
                }
            }
            None => software.to_string(),
        }
    }
}

/// Parse `ffmpeg -encoders` output into the list of video encoder names.
pub fn parse_encoders(output: &str) -> Vec<String> {
    let mut encoders = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.starts_with("Encoders:") {
            continue;
        }

        // Format: " V....D libx264   libx264 H.264 / AVC ..."
        let mut parts = trimmed.split_whitespace();
        let flags = match parts.next() {
            Some(flags) if flags.len() == 6 => flags,
            _ => continue,
        };
        let name = match parts.next() {
            Some(name) => name,
            None => continue,
        };
        // The legend block also has six-character flag columns; real entries never use `=`.
        if flags.starts_with('V') && name != "=" {
            encoders.push(name.to_string());
        }
    }
    encoders
}

/// Parse `ffmpeg -hwaccels` output: a header line followed by one backend per line.
pub fn parse_hwaccels(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.ends_with(':'))
        .map(str::to_string)
        .collect()
}

/// Decide which hardware family, if any, is usable on `platform`.
///
/// A family only counts when its H.264 encoder is compiled in *and* one of its
/// runtime backends is listed; an encoder without a backend is not usable.
pub fn classify_capabilities(
    platform: Platform,
    encoders_output: &str,
    hwaccels_output: &str,
) -> Classification {
    let encoders = parse_encoders(encoders_output);
    if encoders.is_empty() {
        return Classification::ProbeError("no video encoders found in probe output".to_string());
    }
    let decoders = parse_hwaccels(hwaccels_output);

    let encoder_set: HashSet<&str> = encoders.iter().map(String::as_str).collect();
    let backend_set: HashSet<&str> = decoders.iter().map(String::as_str).collect();

    let hardware = platform
        .candidates()
        .iter()
        .copied()
        .find(|family| {
            let Some(suffix) = family.encoder_suffix() else {
                return false;
            };
            let has_encoder = encoder_set.contains(format!("h264_{suffix}").as_str());
            let has_backend = family.backends().iter().any(|b| backend_set.contains(b));
            if has_encoder && !has_backend {
                debug!("h264_{} compiled in but no runtime backend listed", suffix);
            }
            has_encoder && has_backend
        })
        .unwrap_or(HardwareType::None);

    Classification::Detected {
        hardware,
        encoders,
        decoders,
    }
}

/// Lazily probes the encoder binary and caches the snapshot.
///
/// Only successful probes are cached; a failed probe returns a software snapshot
/// carrying the error and is retried on the next call.
pub struct CapabilityProbe {
    ffmpeg: PathBuf,
    platform: Platform,
    timeout: Duration,
    max_output_bytes: usize,
    cached: Mutex<Option<Arc<CapabilitySnapshot>>>,
}

impl CapabilityProbe {
    pub fn new(ffmpeg: PathBuf, config: &ProbeConfig) -> Self {
        Self {
            ffmpeg,
            platform: Platform::current(),
            timeout: config.timeout(),
            max_output_bytes: config.max_output_bytes,
            cached: Mutex::new(None),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Return the cached snapshot, probing on first use.
    ///
    /// The lock is held across the probe so concurrent first callers share one run.
    pub async fn detect(&self) -> Arc<CapabilitySnapshot> {
        let mut cached = self.cached.lock().await;
        if let Some(snapshot) = cached.as_ref() {
            return Arc::clone(snapshot);
        }

        let snapshot = Arc::new(self.probe().await);
        if snapshot.error.is_none() {
            *cached = Some(Arc::clone(&snapshot));
        }
        snapshot
    }

    /// Drop the cached snapshot so the next [`detect`](Self::detect) re-probes.
    pub async fn reset(&self) {
        *self.cached.lock().await = None;
    }

    async fn probe(&self) -> CapabilitySnapshot {
        let os = std::env::consts::OS;
        let arch = std::env::consts::ARCH;
        info!("=== Hardware Detection Starting ===");
        info!("OS: {}", os);
        info!("Architecture: {}", arch);

        let classification = match self.run_probes().await {
            Ok((encoders, hwaccels)) => classify_capabilities(self.platform, &encoders, &hwaccels),
            Err(e) => Classification::ProbeError(e.to_string()),
        };

        let snapshot = CapabilitySnapshot::from_classification(os, arch, classification);
        match (&snapshot.error, snapshot.has_gpu) {
            (Some(error), _) => {
                warn!("✗ {}. Using software encoding.", error)
            }
            (None, true) => info!("✓ Hardware acceleration: {}", snapshot.hardware_type),
            (None, false) => info!("✗ No hardware encoder available. Using software encoding."),
        }
        snapshot
    }

    async fn run_probes(&self) -> Result<(String, String)> {
        let encoders = run_bounded(
            &self.ffmpeg,
            &["-hide_banner", "-encoders"],
            self.timeout,
            self.max_output_bytes,
        )
        .await
        .map_err(capability_failure)?;
        if !encoders.usable() {
            return Err(ConversionError::CapabilityProbeFailure(format!(
                "ffmpeg -encoders exited with {}",
                encoders.status
            )));
        }

        let hwaccels = run_bounded(
            &self.ffmpeg,
            &["-hide_banner", "-hwaccels"],
            self.timeout,
            self.max_output_bytes,
        )
        .await
        .map_err(capability_failure)?;
        if !hwaccels.usable() {
            return Err(ConversionError::CapabilityProbeFailure(format!(
                "ffmpeg -hwaccels exited with {}",
                hwaccels.status
            )));
        }

        Ok((encoders.stdout, hwaccels.stdout))
    }
}

fn capability_failure(e: ConversionError) -> ConversionError {
    match e {
        ConversionError::ProbeFailure(message) => ConversionError::CapabilityProbeFailure(message),
        other => ConversionError::CapabilityProbeFailure(other.to_string()),
    }
}
