pub mod duration;
pub mod failure;
pub mod ffmpeg;
pub mod progress;
