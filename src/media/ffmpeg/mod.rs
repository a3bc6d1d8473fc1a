//! FFmpeg argument resolution.
//! Maps an output format, quality tier and capability snapshot to encoder arguments.

use crate::config::ProbeConfig;
use crate::error::{ConversionError, Result};
use crate::system::hardware::{CapabilitySnapshot, HardwareType};
use crate::system::probe::run_bounded;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub mod audio;
pub mod cpu;
pub mod mezzanine;
pub mod quality;

mod amf;
mod nvenc;
mod qsv;
mod vaapi;
mod videotoolbox;

pub use quality::QualityTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    H264,
    ProRes,
    #[serde(rename = "DNxHR")]
    DnxHr,
    AudioOnly,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::H264,
        OutputFormat::ProRes,
        OutputFormat::DnxHr,
        OutputFormat::AudioOnly,
    ];

    /// File extension for the container this format is written into.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::H264 => "mp4",
            OutputFormat::ProRes | OutputFormat::DnxHr => "mov",
            OutputFormat::AudioOnly => "m4a",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::H264 => "H264",
            OutputFormat::ProRes => "ProRes",
            OutputFormat::DnxHr => "DNxHR",
            OutputFormat::AudioOnly => "AudioOnly",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Ok(OutputFormat::H264),
            "prores" => Ok(OutputFormat::ProRes),
            "dnxhr" => Ok(OutputFormat::DnxHr),
            "audioonly" | "audio_only" | "audio-only" | "audio" => Ok(OutputFormat::AudioOnly),
            _ => Err(ConversionError::UnsupportedFormat(s.to_string())),
        }
    }
}

pub(crate) fn push_args(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Resolve encoder arguments for one job. Pure: the snapshot is only read.
///
/// H.264 uses the snapshot's hardware family when `prefer_gpu` is set and a GPU is
/// present; everything else is software encoded.
pub fn resolve(
    format: OutputFormat,
    quality: &str,
    snapshot: &CapabilitySnapshot,
    prefer_gpu: bool,
) -> Vec<String> {
    let mut args = Vec::new();
    match format {
        OutputFormat::H264 => {
            let hardware = if prefer_gpu && snapshot.has_gpu {
                snapshot.hardware_type
            } else {
                HardwareType::None
            };
            match hardware {
                HardwareType::Videotoolbox => videotoolbox::apply(&mut args, quality),
                HardwareType::Nvenc => nvenc::apply(&mut args, quality),
                HardwareType::Amf => amf::apply(&mut args, quality),
                HardwareType::Qsv => qsv::apply(&mut args, quality),
                HardwareType::Vaapi => vaapi::apply(&mut args, quality),
                HardwareType::None => cpu::apply(&mut args, quality),
            }
            audio::apply_aac(&mut args);
            push_args(&mut args, &["-movflags", "+faststart"]);
        }
        OutputFormat::ProRes => mezzanine::apply_prores(&mut args, quality),
        OutputFormat::DnxHr => mezzanine::apply_dnxhr(&mut args, quality),
        OutputFormat::AudioOnly => audio::apply_audio_only(&mut args),
    }
    debug!("Resolved {} @ {}: {:?}", format, quality, args);
    args
}

/// [`resolve`] for a format given by name; unknown names fail with `UnsupportedFormat`.
pub fn resolve_named(
    format: &str,
    quality: &str,
    snapshot: &CapabilitySnapshot,
    prefer_gpu: bool,
) -> Result<Vec<String>> {
    let format = OutputFormat::from_str(format)?;
    Ok(resolve(format, quality, snapshot, prefer_gpu))
}

/// Full encoder command line: `-hide_banner -i <input> -y <resolved> <output>`.
pub fn command_args(input: &Path, output: &Path, resolved: &[String]) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-y".to_string(),
    ];
    args.extend(resolved.iter().cloned());
    args.push(output.to_string_lossy().to_string());
    args
}

/// Verify FFmpeg is runnable and return the first line of `-version`.
pub async fn verify_ffmpeg(ffmpeg: &Path, config: &ProbeConfig) -> Result<String> {
    let output = run_bounded(
        ffmpeg,
        &["-version"],
        config.timeout(),
        config.max_output_bytes,
    )
    .await?;

    if !output.usable() {
        return Err(ConversionError::ProbeFailure(format!(
            "ffmpeg -version exited with {}",
            output.status
        )));
    }

    let first_line = output.stdout.lines().next().unwrap_or("unknown").to_string();
    info!("FFmpeg version: {}", first_line);
    Ok(first_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::hardware::{classify_capabilities, Platform};

    fn gpu_snapshot(hardware: HardwareType) -> CapabilitySnapshot {
        let suffix = hardware.encoder_suffix().unwrap_or("none");
        CapabilitySnapshot {
            platform: "test".to_string(),
            arch: "x86_64".to_string(),
            has_gpu: hardware != HardwareType::None,
            hardware_type: hardware,
            encoders: vec!["libx264".to_string(), format!("h264_{suffix}")],
            decoders: Vec::new(),
            description: None,
            error: None,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn software_h264_at_1080p_uses_crf_23() {
        let args = resolve(
            OutputFormat::H264,
            "1080p",
            &CapabilitySnapshot::software("linux", "x86_64"),
            true,
        );
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-crf"), Some("23"));
    }

    #[test]
    fn software_crf_table() {
        let snapshot = CapabilitySnapshot::software("linux", "x86_64");
        let crf = |q: &str| {
            let args = resolve(OutputFormat::H264, q, &snapshot, true);
            value_after(&args, "-crf").map(str::to_string)
        };
        assert_eq!(crf("4K").as_deref(), Some("18"));
        assert_eq!(crf("1440p").as_deref(), Some("20"));
        assert_eq!(crf("720p").as_deref(), Some("25"));
        assert_eq!(crf("480p").as_deref(), Some("28"));
        assert_eq!(crf("potato").as_deref(), Some("23"));
    }

    #[test]
    fn audio_only_never_selects_a_video_codec() {
        for quality in ["4K", "1080p", "whatever", ""] {
            let args = resolve(
                OutputFormat::AudioOnly,
                quality,
                &gpu_snapshot(HardwareType::Nvenc),
                true,
            );
            assert!(args.contains(&"-vn".to_string()));
            assert!(!args.iter().any(|a| a == "-c:v"));
            assert_eq!(value_after(&args, "-c:a"), Some("aac"));
            assert_eq!(value_after(&args, "-b:a"), Some("192k"));
        }
    }

    #[test]
    fn every_format_selects_a_codec() {
        let snapshots = [
            CapabilitySnapshot::software("linux", "x86_64"),
            gpu_snapshot(HardwareType::Videotoolbox),
            gpu_snapshot(HardwareType::Nvenc),
            gpu_snapshot(HardwareType::Amf),
            gpu_snapshot(HardwareType::Qsv),
            gpu_snapshot(HardwareType::Vaapi),
        ];
        for snapshot in &snapshots {
            for format in OutputFormat::ALL {
                let args = resolve(format, "1080p", snapshot, true);
                let flag = if format == OutputFormat::AudioOnly {
                    "-c:a"
                } else {
                    "-c:v"
                };
                assert!(
                    args.iter().any(|a| a == flag),
                    "{format} missing {flag}: {args:?}"
                );
            }
        }
    }

    #[test]
    fn hardware_families_use_their_control_value() {
        let args = resolve(OutputFormat::H264, "4K", &gpu_snapshot(HardwareType::Nvenc), true);
        assert_eq!(value_after(&args, "-c:v"), Some("h264_nvenc"));
        assert_eq!(value_after(&args, "-cq"), Some("19"));

        let args = resolve(
            OutputFormat::H264,
            "720p",
            &gpu_snapshot(HardwareType::Videotoolbox),
            true,
        );
        assert_eq!(value_after(&args, "-c:v"), Some("h264_videotoolbox"));
        assert_eq!(value_after(&args, "-b:v"), Some("5M"));

        let args = resolve(OutputFormat::H264, "480p", &gpu_snapshot(HardwareType::Amf), true);
        assert_eq!(value_after(&args, "-c:v"), Some("h264_amf"));
        assert_eq!(value_after(&args, "-qp_i"), Some("26"));

        let args = resolve(OutputFormat::H264, "1440p", &gpu_snapshot(HardwareType::Qsv), true);
        assert_eq!(value_after(&args, "-c:v"), Some("h264_qsv"));
        assert_eq!(value_after(&args, "-global_quality"), Some("22"));

        let args = resolve(
            OutputFormat::H264,
            "1080p",
            &gpu_snapshot(HardwareType::Vaapi),
            true,
        );
        assert_eq!(value_after(&args, "-c:v"), Some("h264_vaapi"));
        assert_eq!(value_after(&args, "-qp"), Some("24"));
    }

    #[test]
    fn unknown_tiers_fall_back_to_family_defaults() {
        let cases = [
            (HardwareType::Videotoolbox, "-b:v", "8M"),
            (HardwareType::Nvenc, "-cq", "23"),
            (HardwareType::Amf, "-qp_p", "22"),
            (HardwareType::Qsv, "-global_quality", "24"),
            (HardwareType::Vaapi, "-qp", "24"),
        ];
        for (hardware, flag, expected) in cases {
            let args = resolve(OutputFormat::H264, "8K-ultra", &gpu_snapshot(hardware), true);
            assert_eq!(value_after(&args, flag), Some(expected), "{hardware:?}");
        }

        let software = CapabilitySnapshot::software("linux", "x86_64");
        let args = resolve(OutputFormat::ProRes, "8K-ultra", &software, true);
        assert_eq!(value_after(&args, "-profile:v"), Some("2"));
        let args = resolve(OutputFormat::DnxHr, "8K-ultra", &software, true);
        assert_eq!(value_after(&args, "-profile:v"), Some("dnxhr_sq"));
    }

    #[test]
    fn prefer_gpu_false_forces_software() {
        let args = resolve(OutputFormat::H264, "1080p", &gpu_snapshot(HardwareType::Nvenc), false);
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
    }

    #[test]
    fn mezzanine_formats_ignore_gpu() {
        let snapshot = gpu_snapshot(HardwareType::Nvenc);
        let args = resolve(OutputFormat::ProRes, "4K", &snapshot, true);
        assert_eq!(value_after(&args, "-c:v"), Some("prores_ks"));
        assert_eq!(value_after(&args, "-profile:v"), Some("3"));

        let args = resolve(OutputFormat::DnxHr, "720p", &snapshot, true);
        assert_eq!(value_after(&args, "-c:v"), Some("dnxhd"));
        assert_eq!(value_after(&args, "-profile:v"), Some("dnxhr_lb"));
    }

    #[test]
    fn probe_without_backend_resolves_to_software() {
        let snapshot = CapabilitySnapshot::from_classification(
            "linux",
            "x86_64",
            classify_capabilities(
                Platform::OtherUnix,
                " V..... libx264  H.264\n V..... h264_vaapi  VAAPI\n",
                "Hardware acceleration methods:\n",
            ),
        );
        let args = resolve(OutputFormat::H264, "1080p", &snapshot, true);
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let snapshot = CapabilitySnapshot::software("linux", "x86_64");
        match resolve_named("webm", "1080p", &snapshot, true) {
            Err(ConversionError::UnsupportedFormat(name)) => assert_eq!(name, "webm"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
        assert!(resolve_named("prores", "1080p", &snapshot, true).is_ok());
    }

    #[test]
    fn extensions() {
        assert_eq!(OutputFormat::H264.extension(), "mp4");
        assert_eq!(OutputFormat::ProRes.extension(), "mov");
        assert_eq!(OutputFormat::DnxHr.extension(), "mov");
        assert_eq!(OutputFormat::AudioOnly.extension(), "m4a");
    }

    #[test]
    fn command_line_layout() {
        let args = command_args(
            Path::new("/in/a.mkv"),
            Path::new("/out/a.mp4"),
            &["-c:v".to_string(), "libx264".to_string()],
        );
        assert_eq!(
            args,
            vec!["-hide_banner", "-i", "/in/a.mkv", "-y", "-c:v", "libx264", "/out/a.mp4"]
        );
    }
}
