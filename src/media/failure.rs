//! Classification of failed encoder runs from their diagnostic text.

use crate::error::FailureKind;
use std::collections::VecDeque;

/// Checked in order; the first kind with a matching substring wins.
const PATTERNS: &[(FailureKind, &[&str], &str)] = &[
    (
        FailureKind::CorruptInput,
        &[
            "invalid data found when processing input",
            "moov atom not found",
            "corrupt",
            "truncated",
            "error while decoding",
        ],
        "The input file is corrupted or incomplete",
    ),
    (
        FailureKind::DiskSpace,
        &["no space left on device", "disk full", "not enough space"],
        "Not enough disk space to write the output file",
    ),
    (
        FailureKind::PermissionDenied,
        &["permission denied", "access is denied", "operation not permitted"],
        "Permission denied while reading the input or writing the output",
    ),
    (
        FailureKind::CodecMismatch,
        &[
            "unknown encoder",
            "encoder not found",
            "could not find tag for codec",
            "codec not currently supported in container",
            "error while opening encoder",
            "incorrect codec parameters",
        ],
        "The selected codec is not supported for this output",
    ),
];

const ERROR_TOKENS: &[&str] = &["error", "failed", "invalid"];
const MAX_MESSAGE_LEN: usize = 200;

/// A classified failure: its kind and the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: FailureKind,
    pub message: String,
}

pub fn classify_failure(exit_code: Option<i32>, diagnostics: &str) -> Classified {
    let lowered = diagnostics.to_lowercase();
    for (kind, needles, message) in PATTERNS {
        if needles.iter().any(|n| lowered.contains(n)) {
            return Classified {
                kind: *kind,
                message: (*message).to_string(),
            };
        }
    }

    let error_line = diagnostics.lines().map(str::trim).find(|line| {
        let line = line.to_lowercase();
        ERROR_TOKENS.iter().any(|t| line.contains(t))
    });
    if let Some(line) = error_line {
        let line: String = line.chars().take(MAX_MESSAGE_LEN).collect();
        return Classified {
            kind: FailureKind::Unknown,
            message: format!("Encoding failed: {line}"),
        };
    }

    let message = match exit_code {
        Some(code) => format!("Encoding failed with exit code {code}"),
        None => "Encoding failed: encoder was terminated".to_string(),
    };
    Classified {
        kind: FailureKind::Unknown,
        message,
    }
}

/// Bounded tail of the non-progress diagnostic lines of one job.
#[derive(Debug)]
pub struct DiagnosticLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn text(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_space_beats_generic_fallback() {
        let text = "[mp4 @ 0x55] Error writing trailer of out.mp4: No space left on device\nConversion failed!";
        let classified = classify_failure(Some(1), text);
        assert_eq!(classified.kind, FailureKind::DiskSpace);
        assert_eq!(classified.message, "Not enough disk space to write the output file");
    }

    #[test]
    fn patterns_are_checked_in_order() {
        // Both corrupt input and permission text present: corrupt input is listed first.
        let text = "in.mkv: Invalid data found when processing input\nout.mp4: Permission denied";
        assert_eq!(classify_failure(Some(1), text).kind, FailureKind::CorruptInput);
    }

    #[test]
    fn each_kind_is_recognised() {
        let cases = [
            ("moov atom not found", FailureKind::CorruptInput),
            ("/out/x.mp4: Permission denied", FailureKind::PermissionDenied),
            ("Unknown encoder 'h264_nvenc'", FailureKind::CodecMismatch),
            (
                "Could not find tag for codec prores in stream #0, codec not currently supported in container",
                FailureKind::CodecMismatch,
            ),
        ];
        for (text, kind) in cases {
            assert_eq!(classify_failure(Some(1), text).kind, kind, "{text}");
        }
    }

    #[test]
    fn falls_back_to_first_error_line() {
        let text = "Stream mapping:\n  Stream #0:0 -> #0:0\n[libx264 @ 0x1] Something exploded: Error number -22\nmore Error";
        let classified = classify_failure(Some(234), text);
        assert_eq!(classified.kind, FailureKind::Unknown);
        assert_eq!(
            classified.message,
            "Encoding failed: [libx264 @ 0x1] Something exploded: Error number -22"
        );
    }

    #[test]
    fn generic_message_when_nothing_matches() {
        let classified = classify_failure(Some(3), "Stream mapping:\n");
        assert_eq!(classified.message, "Encoding failed with exit code 3");
        let classified = classify_failure(None, "");
        assert_eq!(classified.message, "Encoding failed: encoder was terminated");
    }

    #[test]
    fn diagnostic_log_keeps_tail() {
        let mut log = DiagnosticLog::new(2);
        log.push("a".to_string());
        log.push("b".to_string());
        log.push("c".to_string());
        assert_eq!(log.text(), "b\nc");
    }
}
