pub mod config;
pub mod error;
pub mod job;
pub mod media;
pub mod orchestrator;
pub mod system;

pub use config::Config;
pub use error::{ConversionError, ErrorKind, FailureKind};
pub use job::{
    ActiveJobInfo, ConversionEvent, ConversionOutput, ConversionRequest, JobId, JobState,
    ProgressCallback,
};
pub use media::ffmpeg::{OutputFormat, QualityTier};
pub use media::progress::ProgressSample;
pub use orchestrator::{RunningJob, Transcoder};
pub use system::hardware::{CapabilitySnapshot, HardwareType};
