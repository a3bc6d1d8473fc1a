use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
}

/// Where to find `ffmpeg` and `ffprobe`.
///
/// Explicit paths win over `bin_dir`; with neither set the binaries are looked up on `PATH`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ToolsConfig {
    pub bin_dir: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_max_output_bytes")]
    pub max_output_bytes: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConversionConfig {
    #[serde(default = "default_true")]
    pub prefer_gpu: bool,
    /// Run the duration probe when the caller supplies no duration.
    #[serde(default = "default_true")]
    pub probe_duration: bool,
    #[serde(default = "default_true")]
    pub remove_partial_output: bool,
}

pub fn default_probe_timeout_secs() -> u64 {
    10
}

pub fn default_probe_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout_secs(),
            max_output_bytes: default_probe_max_output_bytes(),
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            prefer_gpu: true,
            probe_duration: true,
            remove_partial_output: true,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = match Config::load(Path::new("/nonexistent/kiln.toml")) {
            Ok(config) => config,
            Err(e) => panic!("expected defaults, got {e}"),
        };
        assert_eq!(config.probe.timeout_secs, 10);
        assert_eq!(config.probe.max_output_bytes, 1024 * 1024);
        assert!(config.conversion.prefer_gpu);
        assert!(config.tools.bin_dir.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = match toml::from_str(
            r#"
            [tools]
            bin_dir = "bin"

            [conversion]
            prefer_gpu = false
            "#,
        ) {
            Ok(config) => config,
            Err(e) => panic!("parse failed: {e}"),
        };
        assert_eq!(config.tools.bin_dir, Some(PathBuf::from("bin")));
        assert!(!config.conversion.prefer_gpu);
        assert!(config.conversion.probe_duration);
        assert_eq!(config.probe.timeout(), Duration::from_secs(10));
    }
}
