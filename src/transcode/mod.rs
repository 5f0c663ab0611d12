//! Output format negotiation and the external encoder.

pub mod ffmpeg;
pub mod format;

pub use ffmpeg::{Encoder, FfmpegEncoder};
pub use format::{AutoBitrate, TranscodeSpec, estimate_bitrate, negotiate};

/// Demuxer name of the platform's DASH audio segments.
pub const SOURCE_FORMAT: &str = "mp4";
