use super::push_args;
use super::quality::{QualityTable, QualityTier};

pub const GLOBAL_QUALITY: QualityTable<u8> = QualityTable {
    entries: &[
        (QualityTier::Uhd, 20),
        (QualityTier::Qhd, 22),
        (QualityTier::FullHd, 24),
        (QualityTier::Hd, 26),
        (QualityTier::Sd, 28),
    ],
    default: 24,
};

pub fn apply(args: &mut Vec<String>, quality: &str) {
    let global_quality = GLOBAL_QUALITY.lookup(quality).to_string();
    push_args(
        args,
        &[
            "-c:v",
            "h264_qsv",
            "-preset",
            "medium",
            "-global_quality",
            global_quality.as_str(),
            "-look_ahead",
            "1",
        ],
    );
}
