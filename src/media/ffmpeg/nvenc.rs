use super::push_args;
use super::quality::{QualityTable, QualityTier};

pub const CQ: QualityTable<u8> = QualityTable {
    entries: &[
        (QualityTier::Uhd, 19),
        (QualityTier::Qhd, 21),
        (QualityTier::FullHd, 23),
        (QualityTier::Hd, 25),
        (QualityTier::Sd, 28),
    ],
    default: 23,
};

pub fn apply(args: &mut Vec<String>, quality: &str) {
    let cq = CQ.lookup(quality).to_string();
    push_args(
        args,
        &[
            "-c:v",
            "h264_nvenc",
            "-preset",
            "p4",
            "-rc",
            "vbr",
            "-cq",
            cq.as_str(),
            "-b:v",
            "0",
            "-pix_fmt",
            "yuv420p",
        ],
    );
}
