//! Incremental parsing of the encoder's diagnostic stream.
//!
//! Nothing here touches a process: [`LineSplitter`] turns raw chunks into lines,
//! [`parse_progress_line`] pulls typed fields out of one line and
//! [`ProgressTracker`] decides which observations become callbacks.

use crate::job::JobId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Fields extracted from one `frame=... time=... speed=...` status line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLine {
    pub elapsed_seconds: f64,
    pub bytes_written: Option<u64>,
    pub speed_multiplier: Option<f64>,
}

/// Payload handed to the progress callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub job_id: JobId,
    /// `None` when the input duration is unknown.
    pub percent: Option<u8>,
    pub elapsed_seconds: f64,
    pub speed_multiplier: Option<f64>,
    pub bytes_written: Option<u64>,
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"time=\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid time regex")
    })
}

fn size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\s)L?(?:total_)?size=\s*(\d+)\s*([kKmMgG]i?B|B)?")
            .expect("valid size regex")
    })
}

fn speed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"speed=\s*(\d+(?:\.\d+)?)x").expect("valid speed regex"))
}

/// Parse one diagnostic line. Lines without a usable elapsed time yield `None`.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let caps = time_re().captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let elapsed_seconds = hours * 3600.0 + minutes * 60.0 + seconds;

    let bytes_written = size_re().captures(line).and_then(|c| {
        let value: u64 = c[1].parse().ok()?;
        let multiplier = match c.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
            Some(unit) if unit.starts_with('k') => 1024,
            Some(unit) if unit.starts_with('m') => 1024 * 1024,
            Some(unit) if unit.starts_with('g') => 1024 * 1024 * 1024,
            _ => 1,
        };
        value.checked_mul(multiplier)
    });

    let speed_multiplier = speed_re()
        .captures(line)
        .and_then(|c| c[1].parse::<f64>().ok());

    Some(ProgressLine {
        elapsed_seconds,
        bytes_written,
        speed_multiplier,
    })
}

/// `min(100, round(elapsed / duration * 100))`, never negative.
pub fn percent_of(elapsed_seconds: f64, duration_seconds: f64) -> u8 {
    let percent = (elapsed_seconds / duration_seconds * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Splits a byte stream into lines on `\n` or `\r`.
///
/// FFmpeg rewrites its status line with carriage returns, so both count as breaks.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.pending).to_string());
                    self.pending.clear();
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Whatever trails the last line break.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).to_string();
        self.pending.clear();
        Some(line)
    }
}

/// Per-job emission state.
///
/// With a known duration a sample is produced only when the percentage rises, so a
/// job emits at most 101 samples. Without one, a sample is produced each time the
/// elapsed time crosses a whole second.
#[derive(Debug)]
pub struct ProgressTracker {
    job_id: JobId,
    duration_seconds: Option<f64>,
    last_emitted_percent: Option<u8>,
    last_emitted_second: Option<u64>,
}

impl ProgressTracker {
    pub fn new(job_id: JobId, duration_seconds: Option<f64>) -> Self {
        Self {
            job_id,
            duration_seconds: duration_seconds.filter(|d| d.is_finite() && *d > 0.0),
            last_emitted_percent: None,
            last_emitted_second: None,
        }
    }

    pub fn last_emitted_percent(&self) -> Option<u8> {
        self.last_emitted_percent
    }

    pub fn observe(&mut self, line: &ProgressLine) -> Option<ProgressSample> {
        let percent = match self.duration_seconds {
            Some(duration) => {
                let percent = percent_of(line.elapsed_seconds, duration);
                if self.last_emitted_percent.is_some_and(|last| percent <= last) {
                    return None;
                }
                self.last_emitted_percent = Some(percent);
                Some(percent)
            }
            None => {
                let second = line.elapsed_seconds.max(0.0).floor() as u64;
                if self.last_emitted_second.is_some_and(|last| second <= last) {
                    return None;
                }
                self.last_emitted_second = Some(second);
                None
            }
        };

        Some(ProgressSample {
            job_id: self.job_id,
            percent,
            elapsed_seconds: line.elapsed_seconds,
            speed_multiplier: line.speed_multiplier,
            bytes_written: line.bytes_written,
        })
    }
}
