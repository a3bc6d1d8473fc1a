use crate::config::ProbeConfig;
use crate::error::{ConversionError, Result};
use crate::system::probe::run_bounded;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Reads a media file's duration with `ffprobe`.
///
/// Duration only improves progress reporting, so every failure resolves to `None`.
#[derive(Debug, Clone)]
pub struct DurationProbe {
    ffprobe: PathBuf,
    timeout: Duration,
    max_output_bytes: usize,
}

impl DurationProbe {
    pub fn new(ffprobe: PathBuf, config: &ProbeConfig) -> Self {
        Self {
            ffprobe,
            timeout: config.timeout(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    pub async fn get_duration(&self, path: &Path) -> Option<f64> {
        match self.probe(path).await {
            Ok(seconds) => {
                debug!("Duration of {:?}: {:.3}s", path, seconds);
                Some(seconds)
            }
            Err(e) => {
                warn!("{}; progress will be reported without a percentage", e);
                None
            }
        }
    }

    async fn probe(&self, path: &Path) -> Result<f64> {
        if !self.ffprobe.is_file() {
            return Err(ConversionError::ProbeFailure(format!(
                "ffprobe not found at {:?}",
                self.ffprobe
            )));
        }

        let path_arg = path.to_string_lossy();
        let output = run_bounded(
            &self.ffprobe,
            &[
                "-v",
                "quiet",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                path_arg.as_ref(),
            ],
            self.timeout,
            self.max_output_bytes,
        )
        .await?;

        if !output.status.success() {
            return Err(ConversionError::ProbeFailure(format!(
                "ffprobe exited with {}",
                output.status
            )));
        }

        parse_duration(&output.stdout).ok_or_else(|| {
            ConversionError::ProbeFailure(format!(
                "unparsable duration output: {:?}",
                output.stdout.trim()
            ))
        })
    }
}

/// First line of probe output as positive, finite seconds.
pub fn parse_duration(output: &str) -> Option<f64> {
    let value: f64 = output.lines().next()?.trim().parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}
