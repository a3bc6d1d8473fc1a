use super::push_args;
use super::quality::{QualityTable, QualityTier};

pub const DEFAULT_DEVICE: &str = "/dev/dri/renderD128";

pub const QP: QualityTable<u8> = QualityTable {
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
    let qp = QP.lookup(quality).to_string();
    push_args(
        args,
        &[
            "-vaapi_device",
            DEFAULT_DEVICE,
            "-vf",
            "format=nv12,hwupload",
            "-c:v",
            "h264_vaapi",
            "-qp",
            qp.as_str(),
        ],
    );
}
