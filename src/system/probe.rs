//! Short, bounded diagnostic invocations of the external tools.
//!
//! Probes differ from conversion jobs: they are expected to finish quickly, so every
//! run carries a timeout and a cap on how much standard output is retained.

use crate::error::{ConversionError, Result};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ProbeOutput {
    pub status: ExitStatus,
    pub stdout: String,
    /// Output hit the byte cap; the process was killed and `stdout` holds the prefix.
    pub truncated: bool,
}

impl ProbeOutput {
    /// True when the output can be trusted: clean exit, or a cap-triggered kill.
    pub fn usable(&self) -> bool {
        self.status.success() || self.truncated
    }
}

/// Run `program args...`, capturing at most `max_bytes` of stdout within `timeout`.
///
/// Stderr is discarded. Spawn failures, I/O errors and timeouts all surface as
/// [`ConversionError::ProbeFailure`]; callers decide how to degrade.
pub async fn run_bounded(
    program: &Path,
    args: &[&str],
    timeout: Duration,
    max_bytes: usize,
) -> Result<ProbeOutput> {
    let program_name = program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string_lossy().to_string());

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ConversionError::ProbeFailure(format!("failed to spawn {program_name}: {e}")))?;

    let mut stdout = child.stdout.take().ok_or_else(|| {
        ConversionError::ProbeFailure(format!("failed to capture stdout of {program_name}"))
    })?;

    let work = async {
        let mut buf = Vec::new();
        (&mut stdout)
            .take(max_bytes as u64)
            .read_to_end(&mut buf)
            .await?;
        let truncated = buf.len() >= max_bytes;
        if truncated {
            warn!("{program_name} output exceeded {max_bytes} bytes; truncating");
            drop(stdout);
            // The child may already have exited on its own.
            let _ = child.start_kill();
        }
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((buf, status, truncated))
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(Ok((buf, status, truncated))) => {
            debug!(
                "{} {:?} exited with {} ({} bytes)",
                program_name,
                args,
                status,
                buf.len()
            );
            Ok(ProbeOutput {
                status,
                stdout: String::from_utf8_lossy(&buf).to_string(),
                truncated,
            })
        }
        Ok(Err(e)) => Err(ConversionError::ProbeFailure(format!(
            "I/O error while running {program_name}: {e}"
        ))),
        Err(_elapsed) => Err(ConversionError::ProbeFailure(format!(
            "{program_name} timed out after {timeout:?}"
        ))),
    }
}
