//! Frame position to strip position mapping.
//!
//! A detection lights the LED under the horizontal centre of its box:
//! `floor(center_x / frame_width * led_count)`, clamped into the strip.

use anyhow::{anyhow, Result};

use crate::detect::{BoundingBox, Detection};

/// Position along the LED strip, always in `0..led_count`.
pub type DeviceIndex = u32;

/// Maps target-class detections onto strip positions.
#[derive(Clone, Debug)]
pub struct StripMapper {
    led_count: u32,
    keyword: String,
}

impl StripMapper {
    pub fn new(led_count: u32, keyword: &str) -> Result<Self> {
        if led_count == 0 {
            return Err(anyhow!("LED strip must have at least one LED"));
        }
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return Err(anyhow!("target label keyword must not be empty"));
        }
        Ok(Self { led_count, keyword })
    }

    pub fn led_count(&self) -> u32 {
        self.led_count
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Case-insensitive substring match against the target keyword.
    pub fn matches(&self, label: &str) -> bool {
        label.to_lowercase().contains(&self.keyword)
    }

    /// Strip index for a horizontal pixel position. Positions outside the
    /// frame clamp to the nearest end of the strip.
    pub fn index_for_center(&self, center_x: f32, frame_width: u32) -> DeviceIndex {
        let last = self.led_count - 1;
        let raw = (center_x as f64 / frame_width as f64 * self.led_count as f64).floor();
        if raw.is_nan() || raw <= 0.0 {
            0
        } else if raw >= last as f64 {
            last
        } else {
            raw as DeviceIndex
        }
    }

    pub fn index_for(&self, bbox: &BoundingBox, frame_width: u32) -> DeviceIndex {
        self.index_for_center(bbox.center_x(), frame_width)
    }

    /// Indices for every matching detection, in detection order.
    ///
    /// Several detections landing on one LED each contribute an entry. An
    /// empty result means nothing matched, which the strip treats as "clear".
    pub fn map(&self, detections: &[Detection], frame_width: u32) -> Result<Vec<DeviceIndex>> {
        if frame_width == 0 {
            return Err(anyhow!("cannot map detections on a zero-width frame"));
        }
        Ok(detections
            .iter()
            .filter(|det| self.matches(&det.label))
            .map(|det| self.index_for(&det.bbox, frame_width))
            .collect())
    }
}
