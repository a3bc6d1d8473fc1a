use super::push_args;
use super::quality::{QualityTable, QualityTier};

pub const QP: QualityTable<u8> = QualityTable {
    entries: &[
        (QualityTier::Uhd, 18),
        (QualityTier::Qhd, 20),
        (QualityTier::FullHd, 22),
        (QualityTier::Hd, 24),
        (QualityTier::Sd, 26),
    ],
    default: 22,
};

pub fn apply(args: &mut Vec<String>, quality: &str) {
    let qp = QP.lookup(quality).to_string();
    push_args(
        args,
        &[
            "-c:v",
            "h264_amf",
            "-quality",
            "balanced",
            "-rc",
            "cqp",
            "-qp_i",
            qp.as_str(),
            "-qp_p",
            qp.as_str(),
        ],
    );
}
