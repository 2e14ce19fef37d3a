//! Local video file source.
//!
//! `FileSource` plays a sample video from the local filesystem. Decoding is
//! done in-memory through FFmpeg; `stub://` paths yield a finite synthetic clip
//! (`stub://name?frames=N`, 30 frames by default) so end-of-stream handling
//! can be exercised without a codec.

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{stub_frame_limit, SyntheticFrames};
use super::FrameSource;
use crate::frame::Frame;

const STUB_DEFAULT_FRAMES: u64 = 30;
const STUB_WIDTH: u32 = 640;
const STUB_HEIGHT: u32 = 360;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "samples/road.mp4").
    pub path: String,
}

/// Local file frame source.
pub struct FileSource {
    path: String,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFrames),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Open the file. Fails when the path is remote, missing or undecodable.
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "sample playback only supports local paths (got '{}')",
                config.path
            ));
        }
        if config.path.starts_with("stub://") {
            let limit = stub_frame_limit(&config.path).unwrap_or(STUB_DEFAULT_FRAMES);
            log::info!("FileSource: opened {} (synthetic, {} frames)", config.path, limit);
            return Ok(Self {
                path: config.path,
                backend: FileBackend::Synthetic(SyntheticFrames::new(
                    STUB_WIDTH,
                    STUB_HEIGHT,
                    Some(limit),
                )),
            });
        }
        if !std::path::Path::new(&config.path).is_file() {
            return Err(anyhow!("sample video '{}' does not exist", config.path));
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            let source = FfmpegFileSource::open(&config.path)?;
            Ok(Self {
                path: config.path,
                backend: FileBackend::Ffmpeg(source),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(anyhow!(
                "sample playback requires the ingest-file-ffmpeg feature"
            ))
        }
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn frames_captured(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.frames_captured(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_captured(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
