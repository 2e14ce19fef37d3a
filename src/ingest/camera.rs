//! Live camera source.
//!
//! Cameras are addressed by index, mapped onto a device location by
//! appending the index to a prefix (`/dev/video` + `1` → `/dev/video1`).
//! Opening tries the secondary index first (typically an external USB camera)
//! and falls back to the primary one (the built-in camera).
//!
//! Real devices go through libv4l (feature: ingest-v4l2). A `stub://` prefix
//! yields an endless synthetic feed.

use anyhow::{anyhow, Result};

use super::synthetic::SyntheticFrames;
use super::FrameSource;
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device location prefix; the camera index is appended.
    pub device_prefix: String,
    /// Camera used when the secondary one cannot be opened.
    pub primary_index: u32,
    /// Camera tried first, when set.
    pub secondary_index: Option<u32>,
    /// Requested capture width. The driver may pick something else.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
    /// Requested frame rate; 0 leaves the driver default.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_prefix: "/dev/video".to_string(),
            primary_index: 0,
            secondary_index: Some(1),
            width: 1920,
            height: 1080,
            target_fps: 0,
        }
    }
}

impl CameraConfig {
    /// Device locations in the order they are tried.
    pub fn candidates(&self) -> Vec<String> {
        let mut indices = Vec::with_capacity(2);
        if let Some(secondary) = self.secondary_index {
            indices.push(secondary);
        }
        if !indices.contains(&self.primary_index) {
            indices.push(self.primary_index);
        }
        indices
            .into_iter()
            .map(|index| format!("{}{}", self.device_prefix, index))
            .collect()
    }
}

/// Camera frame source.
pub struct CameraSource {
    device: String,
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticFrames),
    #[cfg(feature = "ingest-v4l2")]
    Device(device::DeviceCamera),
}

impl CameraSource {
    /// Open the first camera that responds, in `candidates()` order.
    pub fn open(config: CameraConfig) -> Result<Self> {
        let mut failures = Vec::new();
        for device in config.candidates() {
            match open_backend(&device, &config) {
                Ok(backend) => return Ok(Self { device, backend }),
                Err(err) => {
                    log::warn!("CameraSource: {} unavailable: {:#}", device, err);
                    failures.push(format!("{}: {:#}", device, err));
                }
            }
        }
        Err(anyhow!("could not open webcam ({})", failures.join("; ")))
    }
}

fn open_backend(device: &str, config: &CameraConfig) -> Result<CameraBackend> {
    if device.starts_with("stub://") {
        log::info!(
            "CameraSource: connected to {} (synthetic {}x{})",
            device,
            config.width,
            config.height
        );
        return Ok(CameraBackend::Synthetic(SyntheticFrames::new(
            config.width,
            config.height,
            None,
        )));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        device::DeviceCamera::open(device, config).map(CameraBackend::Device)
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(anyhow!(
            "camera capture requires the ingest-v4l2 feature"
        ))
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        self.device.clone()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    fn frames_captured(&self) -> u64 {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.frames_captured(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.frame_count,
        }
    }
}

// ----------------------------------------------------------------------------
// V4L2 devices via libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
mod device {
    use anyhow::{Context, Result};
    use ouroboros::self_referencing;

    use super::CameraConfig;
    use crate::frame::Frame;
    use crate::ingest::normalize::{normalize_to_rgb, PixelFormat};

    pub(super) struct DeviceCamera {
        state: DeviceState,
        format: PixelFormat,
        width: u32,
        height: u32,
        pub(super) frame_count: u64,
    }

    #[self_referencing]
    struct DeviceState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceCamera {
        pub(super) fn open(path: &str, config: &CameraConfig) -> Result<Self> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device =
                v4l::Device::with_path(path).with_context(|| format!("open v4l2 device {}", path))?;
            let mut requested = device.format().context("read v4l2 format")?;
            requested.width = config.width;
            requested.height = config.height;

            // Prefer RGB straight from the driver; most webcams only offer YUYV.
            let mut active = None;
            for fourcc in [b"RGB3", b"YUYV"] {
                requested.fourcc = v4l::FourCC::new(fourcc);
                match device.set_format(&requested) {
                    Ok(format) if &format.fourcc.repr == fourcc => {
                        active = Some(format);
                        break;
                    }
                    Ok(format) => log::debug!(
                        "CameraSource: {} substituted {} for {}",
                        path,
                        format.fourcc,
                        requested.fourcc
                    ),
                    Err(err) => log::warn!(
                        "CameraSource: failed to set {} on {}: {}",
                        requested.fourcc,
                        path,
                        err
                    ),
                }
            }
            let format = active
                .with_context(|| format!("{} offers neither RGB3 nor YUYV capture", path))?;
            let pixel_format = if &format.fourcc.repr == b"RGB3" {
                PixelFormat::Rgb24
            } else {
                PixelFormat::Yuyv
            };

            if config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!("CameraSource: failed to set fps on {}: {}", path, err);
                }
            }

            let state = DeviceStateTryBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
                },
            }
            .try_build()?;

            log::info!(
                "CameraSource: connected to {} ({}x{} {:?})",
                path,
                format.width,
                format.height,
                pixel_format
            );

            Ok(Self {
                state,
                format: pixel_format,
                width: format.width,
                height: format.height,
                frame_count: 0,
            })
        }

        pub(super) fn next_frame(&mut self) -> Result<Option<Frame>> {
            use v4l::io::traits::CaptureStream;

            let (width, height, format) = (self.width, self.height, self.format);
            let pixels = self.state.with_mut(|fields| -> Result<Vec<u8>> {
                let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
                normalize_to_rgb(buf, width, height, format)
            })?;

            self.frame_count += 1;
            Frame::from_rgb(pixels, width, height).map(Some)
        }
    }
}
