use super::push_args;

pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE: &str = "192k";

/// Audio track settings shared by the MP4 video outputs.
pub fn apply_aac(args: &mut Vec<String>) {
    push_args(args, &["-c:a", AUDIO_CODEC, "-b:a", AUDIO_BITRATE]);
}

/// Drop the video stream entirely. No video codec flag is emitted.
pub fn apply_audio_only(args: &mut Vec<String>) {
    push_args(args, &["-vn"]);
    apply_aac(args);
}
