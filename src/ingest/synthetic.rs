use anyhow::Result;

use crate::frame::Frame;

/// Procedural frame generator behind the `stub://` locations.
///
/// Produces a slowly shifting gradient and stops after `limit` frames when one is set.
pub(crate) struct SyntheticFrames {
    width: u32,
    height: u32,
    limit: Option<u64>,
    frame_count: u64,
}

impl SyntheticFrames {
    pub(crate) fn new(width: u32, height: u32, limit: Option<u64>) -> Self {
        Self {
            width,
            height,
            limit,
            frame_count: 0,
        }
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        self.frame_count += 1;

        let width = self.width as usize;
        let mut pixels = vec![0u8; width * self.height as usize * 3];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = (i % width) as u64;
            let y = (i / width) as u64;
            px[0] = ((x + self.frame_count) % 256) as u8;
            px[1] = (y % 256) as u8;
            px[2] = ((x + y) % 256) as u8;
        }
        Frame::from_rgb(pixels, self.width, self.height).map(Some)
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

/// Parse the optional `?frames=N` suffix of a `stub://` location.
pub(crate) fn stub_frame_limit(location: &str) -> Option<u64> {
    let (_, query) = location.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "frames")
        .and_then(|(_, value)| value.parse().ok())
}
