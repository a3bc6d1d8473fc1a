use super::push_args;
use super::quality::{QualityTable, QualityTier};

/// Target bitrate; VideoToolbox has no constant-quality mode on all machines.
pub const BITRATE: QualityTable<&str> = QualityTable {
    entries: &[
        (QualityTier::Uhd, "20M"),
        (QualityTier::Qhd, "12M"),
        (QualityTier::FullHd, "8M"),
        (QualityTier::Hd, "5M"),
        (QualityTier::Sd, "2500k"),
    ],
    default: "8M",
};

pub fn apply(args: &mut Vec<String>, quality: &str) {
    push_args(
        args,
        &[
            "-c:v",
            "h264_videotoolbox",
            "-b:v",
            BITRATE.lookup(quality),
            "-profile:v",
            "high",
            "-pix_fmt",
            "yuv420p",
        ],
    );
}
