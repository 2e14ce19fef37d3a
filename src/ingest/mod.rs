//! Frame ingestion sources.
//!
//! Two kinds of source feed the pipeline:
//! - Live cameras (V4L2 devices, feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! Both accept `stub://` locations that produce synthetic frames, so the
//! pipeline can be exercised without hardware or codecs.
//!
//! Sources are opened once at session start; an open failure is reported then
//! and never per frame. `next_frame` returns `Ok(None)` at end of stream.

pub mod camera;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;

use anyhow::Result;

use crate::frame::Frame;

pub use camera::{CameraConfig, CameraSource};
pub use file::{FileConfig, FileSource};

/// Which input a session is running from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    Sample,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Camera => f.write_str("camera"),
            SourceKind::Sample => f.write_str("sample"),
        }
    }
}

/// A connected producer of frames.
pub trait FrameSource: Send {
    /// Human-readable location (device path or file path).
    fn describe(&self) -> String;

    /// Capture the next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Frames produced so far.
    fn frames_captured(&self) -> u64;
}
