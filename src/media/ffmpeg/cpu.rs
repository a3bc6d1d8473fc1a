use super::push_args;
use super::quality::{QualityTable, QualityTier};
use crate::system::hardware::SOFTWARE_H264_ENCODER;

pub const CRF: QualityTable<u8> = QualityTable {
    entries: &[
        (QualityTier::Uhd, 18),
        (QualityTier::Qhd, 20),
        (QualityTier::FullHd, 23),
        (QualityTier::Hd, 25),
        (QualityTier::Sd, 28),
    ],
    default: 23,
};

pub fn apply(args: &mut Vec<String>, quality: &str) {
    let crf = CRF.lookup(quality).to_string();
    push_args(
        args,
        &[
            "-c:v",
            SOFTWARE_H264_ENCODER,
            "-preset",
            "medium",
            "-crf",
            crf.as_str(),
            "-pix_fmt",
            "yuv420p",
        ],
    );
}
