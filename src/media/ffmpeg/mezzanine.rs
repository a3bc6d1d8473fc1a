//! Edit-friendly intermediate codecs. Always software encoded.

use super::push_args;
use super::quality::{QualityTable, QualityTier};

/// `prores_ks` profile: 0 proxy, 1 LT, 2 standard, 3 HQ.
pub const PRORES_PROFILE: QualityTable<u8> = QualityTable {
    entries: &[
        (QualityTier::Uhd, 3),
        (QualityTier::Qhd, 3),
        (QualityTier::FullHd, 2),
        (QualityTier::Hd, 1),
        (QualityTier::Sd, 0),
    ],
    default: 2,
};

pub const DNXHR_PROFILE: QualityTable<&str> = QualityTable {
    entries: &[
        (QualityTier::Uhd, "dnxhr_hq"),
        (QualityTier::Qhd, "dnxhr_hq"),
        (QualityTier::FullHd, "dnxhr_sq"),
        (QualityTier::Hd, "dnxhr_lb"),
        (QualityTier::Sd, "dnxhr_lb"),
    ],
    default: "dnxhr_sq",
};

pub fn apply_prores(args: &mut Vec<String>, quality: &str) {
    let profile = PRORES_PROFILE.lookup(quality).to_string();
    push_args(
        args,
        &[
            "-c:v",
            "prores_ks",
            "-profile:v",
            profile.as_str(),
            "-vendor",
            "apl0",
            "-pix_fmt",
            "yuv422p10le",
            "-c:a",
            "pcm_s16le",
        ],
    );
}

pub fn apply_dnxhr(args: &mut Vec<String>, quality: &str) {
    push_args(
        args,
        &[
            "-c:v",
            "dnxhd",
            "-profile:v",
            DNXHR_PROFILE.lookup(quality),
            "-pix_fmt",
            "yuv422p",
            "-c:a",
            "pcm_s16le",
        ],
    );
}
