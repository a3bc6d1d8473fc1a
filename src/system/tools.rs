//! Location of the external encoder and metadata-probe binaries.

use crate::config::ToolsConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

/// Resolved paths to the binaries this crate drives.
///
/// Resolution never fails: a tool that cannot be found resolves to a path that does
/// not exist, and [`ToolPaths::ffmpeg_present`] reports it at job start.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl ToolPaths {
    pub fn resolve(config: &ToolsConfig) -> Self {
        let ffmpeg = resolve_one(FFMPEG, config.ffmpeg_path.as_deref(), config.bin_dir.as_deref());
        let ffprobe =
            resolve_one(FFPROBE, config.ffprobe_path.as_deref(), config.bin_dir.as_deref());
        debug!("Tool paths: ffmpeg={:?} ffprobe={:?}", ffmpeg, ffprobe);
        Self { ffmpeg, ffprobe }
    }

    /// Both binaries live side by side in `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            ffmpeg: dir.join(executable_name(FFMPEG)),
            ffprobe: dir.join(executable_name(FFPROBE)),
        }
    }

    pub fn ffmpeg_present(&self) -> bool {
        self.ffmpeg.is_file()
    }

    pub fn ffprobe_present(&self) -> bool {
        self.ffprobe.is_file()
    }
}

/// Tool name with the platform executable suffix (`.exe` on Windows).
pub fn executable_name(tool: &str) -> String {
    format!("{}{}", tool, std::env::consts::EXE_SUFFIX)
}

fn resolve_one(tool: &str, explicit: Option<&Path>, bin_dir: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(dir) = bin_dir {
        return dir.join(executable_name(tool));
    }
    which::which(tool).unwrap_or_else(|_| PathBuf::from(executable_name(tool)))
}
