//! Detection overlays and viewport fitting.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::frame::Frame;
use crate::mailbox::{Delivery, Mailbox};
use crate::mapper::StripMapper;

/// Size used before the real viewport is known.
pub const FALLBACK_VIEWPORT: Viewport = Viewport {
    width: 900,
    height: 550,
};

const TARGET_COLOUR: Rgb<u8> = Rgb([255, 64, 64]);
const OTHER_COLOUR: Rgb<u8> = Rgb([97, 218, 251]);
const BOX_THICKNESS: u32 = 3;
const CAPTION_TEXT: Rgb<u8> = Rgb([0, 0, 0]);
const CAPTION_SCALE: f32 = 16.0;
const CAPTION_PAD: u32 = 2;
const CAPTION_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono-Bold.ttf");
const PREVIEW_POLL: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A viewport with a side of 1px or less has not been laid out yet.
    pub fn is_known(&self) -> bool {
        self.width > 1 && self.height > 1
    }
}

/// Largest size with the image's aspect ratio where one side matches the
/// viewport exactly and the other fits inside it.
pub fn fit_dimensions(width: u32, height: u32, viewport: Viewport) -> (u32, u32) {
    let viewport = if viewport.is_known() {
        viewport
    } else {
        FALLBACK_VIEWPORT
    };
    if width == 0 || height == 0 {
        return (viewport.width, viewport.height);
    }

    let (width, height) = (width as f64, height as f64);
    let height_at_full_width = viewport.width as f64 * height / width;
    let (w, h) = if height_at_full_width <= viewport.height as f64 {
        (viewport.width, height_at_full_width as u32)
    } else {
        ((viewport.height as f64 * width / height) as u32, viewport.height)
    };
    (w.clamp(1, viewport.width), h.clamp(1, viewport.height))
}

/// Draws detection boxes and scales the result for display.
pub struct Renderer {
    mapper: StripMapper,
    viewport: Viewport,
    font: FontArc,
}

impl Renderer {
    pub fn new(mapper: StripMapper, viewport: Viewport) -> Result<Self> {
        let font = FontArc::try_from_slice(CAPTION_FONT).context("load caption font")?;
        Ok(Self {
            mapper,
            viewport,
            font,
        })
    }

    /// Outline every detection and caption it with label and confidence.
    /// Boxes of the target class are highlighted.
    pub fn draw_overlays(&self, frame: &Frame, detections: &[Detection]) -> RgbImage {
        let mut image = frame.to_image();
        for det in detections {
            let Some(outer) = box_rect(det, 0.0, frame.width, frame.height) else {
                continue;
            };
            let colour = if self.mapper.matches(&det.label) {
                TARGET_COLOUR
            } else {
                OTHER_COLOUR
            };
            for inset in 0..BOX_THICKNESS {
                if let Some(rect) = box_rect(det, inset as f32, frame.width, frame.height) {
                    draw_hollow_rect_mut(&mut image, rect, colour);
                }
            }
            self.draw_caption(&mut image, outer, det, colour);
        }
        image
    }

    /// Filled band above the box (inside it when the box touches the top edge).
    fn draw_caption(&self, image: &mut RgbImage, outer: Rect, det: &Detection, colour: Rgb<u8>) {
        let text = caption(det);
        let scale = PxScale::from(CAPTION_SCALE);
        let (band_w, band_h) = self.caption_band(&text);
        let band_y = if outer.top() >= band_h as i32 {
            outer.top() - band_h as i32
        } else {
            outer.top()
        };
        let band = Rect::at(outer.left(), band_y).of_size(band_w, band_h);
        draw_filled_rect_mut(image, band, colour);
        draw_text_mut(
            image,
            CAPTION_TEXT,
            outer.left() + CAPTION_PAD as i32,
            band_y + CAPTION_PAD as i32,
            scale,
            &self.font,
            &text,
        );
    }

    /// Caption band size: text advance by line height, plus padding.
    fn caption_band(&self, text: &str) -> (u32, u32) {
        let scale = PxScale::from(CAPTION_SCALE);
        let (text_w, _) = text_size(scale, &self.font, text);
        let scaled = self.font.as_scaled(scale);
        let line_h = (scaled.ascent() - scaled.descent()).ceil() as u32;
        (text_w + 2 * CAPTION_PAD, line_h + 2 * CAPTION_PAD)
    }

    /// Resize to the viewport with the aspect ratio preserved.
    pub fn fit(&self, image: &RgbImage) -> RgbImage {
        let (w, h) = fit_dimensions(image.width(), image.height(), self.viewport);
        if (w, h) == image.dimensions() {
            return image.clone();
        }
        image::imageops::resize(image, w, h, FilterType::Triangle)
    }

    /// Overlay then fit: the image posted to the display.
    pub fn render(&self, frame: &Frame, detections: &[Detection]) -> RgbImage {
        self.fit(&self.draw_overlays(frame, detections))
    }
}

/// Overlay caption: class label and confidence.
pub fn caption(det: &Detection) -> String {
    format!("{} {:.2}", det.label, det.confidence)
}

fn box_rect(det: &Detection, inset: f32, frame_width: u32, frame_height: u32) -> Option<Rect> {
    let x0 = (det.bbox.x_min + inset).max(0.0);
    let y0 = (det.bbox.y_min + inset).max(0.0);
    let x1 = (det.bbox.x_max - inset).min(frame_width as f32);
    let y1 = (det.bbox.y_max - inset).min(frame_height as f32);
    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

/// Display sink that keeps the newest rendered frame on disk as a JPEG.
pub struct PreviewSink {
    path: PathBuf,
}

impl PreviewSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the preview file. Written beside the target and renamed so a
    /// viewer never sees a partial image.
    pub fn show(&self, image: &RgbImage) -> Result<()> {
        let tmp = self.path.with_extension("tmp.jpg");
        image
            .save_with_format(&tmp, image::ImageFormat::Jpeg)
            .with_context(|| format!("write preview {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace preview {}", self.path.display()))?;
        Ok(())
    }

    /// Blank the display.
    pub fn clear(&self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::debug!("could not remove preview {}: {}", self.path.display(), err);
            }
        }
    }

    /// Drain `mailbox` on a background thread until it is closed. The
    /// preview is blanked whenever the mailbox is cleared at session end.
    pub fn spawn(self, mailbox: Arc<Mailbox<RgbImage>>) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("preview".to_string())
            .spawn(move || {
                let mut seen_clears = mailbox.clears();
                let mut failing = false;
                while !mailbox.is_closed() {
                    match mailbox.recv_timeout(PREVIEW_POLL, &mut seen_clears) {
                        Delivery::Value(image) => match self.show(&image) {
                            Ok(()) => failing = false,
                            Err(err) if !failing => {
                                log::warn!("preview update failed: {:#}", err);
                                failing = true;
                            }
                            Err(_) => {}
                        },
                        Delivery::Cleared => self.clear(),
                        Delivery::Empty => {}
                    }
                }
                self.clear();
            })
            .context("spawn preview thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    #[test]
    fn width_limited_fit() {
        // 16:9 into a tall viewport: width matches, height shrinks.
        assert_eq!(fit_dimensions(1920, 1080, Viewport::new(800, 800)), (800, 450));
    }

    #[test]
    fn height_limited_fit() {
        assert_eq!(fit_dimensions(1920, 1080, Viewport::new(1600, 450)), (800, 450));
    }

    #[test]
    fn unknown_viewport_uses_fallback() {
        assert_eq!(fit_dimensions(1920, 1080, Viewport::new(1, 1)), (900, 506));
        assert_eq!(fit_dimensions(640, 480, Viewport::new(0, 700)), (733, 550));
    }

    #[test]
    fn fitted_size_never_exceeds_viewport() {
        for (w, h) in [(1, 1000), (1000, 1), (640, 480), (3, 7)] {
            let (fw, fh) = fit_dimensions(w, h, Viewport::new(300, 200));
            assert!(fw >= 1 && fw <= 300 && fh >= 1 && fh <= 200);
            assert!(fw == 300 || fh == 200);
        }
    }

    fn renderer(width: u32, height: u32) -> Result<Renderer> {
        Renderer::new(StripMapper::new(10, "pothole")?, Viewport::new(width, height))
    }

    #[test]
    fn target_boxes_are_highlighted() -> Result<()> {
        let frame = Frame::filled(200, 120, [0, 0, 0])?;
        let detections = vec![
            Detection::new("pothole", BoundingBox::new(5.0, 60.0, 90.0, 110.0), 0.9),
            Detection::new("car", BoundingBox::new(105.0, 60.0, 190.0, 110.0), 0.9),
        ];
        let image = renderer(200, 120)?.draw_overlays(&frame, &detections);
        assert_eq!(image.get_pixel(5, 109), &TARGET_COLOUR);
        assert_eq!(image.get_pixel(105, 109), &OTHER_COLOUR);
        assert_eq!(image.get_pixel(50, 90).0, [0, 0, 0]);
        Ok(())
    }

    #[test]
    fn captions_sit_above_their_boxes() -> Result<()> {
        let frame = Frame::filled(200, 120, [0, 0, 0])?;
        let det = Detection::new("pothole", BoundingBox::new(10.0, 60.0, 150.0, 110.0), 0.87);
        assert_eq!(caption(&det), "pothole 0.87");

        let renderer = renderer(200, 120)?;
        let (band_w, band_h) = renderer.caption_band(&caption(&det));
        let image = renderer.draw_overlays(&frame, &[det]);

        let band: Vec<Rgb<u8>> = (10..10 + band_w)
            .flat_map(|x| (60 - band_h..60).map(move |y| (x, y)))
            .map(|(x, y)| *image.get_pixel(x, y))
            .collect();
        assert!(band.contains(&TARGET_COLOUR), "caption band missing");
        assert!(
            band.iter().any(|p| *p != TARGET_COLOUR),
            "caption text missing"
        );
        // Nothing is drawn above the band.
        assert_eq!(image.get_pixel(12, 60 - band_h - 1).0, [0, 0, 0]);
        Ok(())
    }

    #[test]
    fn caption_moves_inside_box_at_top_edge() -> Result<()> {
        let frame = Frame::filled(200, 120, [0, 0, 0])?;
        let det = Detection::new("car", BoundingBox::new(10.0, 0.0, 150.0, 100.0), 0.5);
        let renderer = renderer(200, 120)?;
        let (band_w, band_h) = renderer.caption_band(&caption(&det));
        let image = renderer.draw_overlays(&frame, &[det]);
        // Bottom-right padding corner of the band, inside the box.
        assert_eq!(image.get_pixel(10 + band_w - 1, band_h - 1), &OTHER_COLOUR);
        assert_eq!(image.get_pixel(10 + band_w + 5, band_h + 5).0, [0, 0, 0]);
        Ok(())
    }

    #[test]
    fn boxes_outside_the_frame_are_skipped() -> Result<()> {
        let frame = Frame::filled(20, 20, [0, 0, 0])?;
        let renderer = renderer(20, 20)?;
        let detections = vec![Detection::new(
            "pothole",
            BoundingBox::new(50.0, 50.0, 60.0, 60.0),
            0.9,
        )];
        let image = renderer.draw_overlays(&frame, &detections);
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
        Ok(())
    }

    #[test]
    fn render_scales_to_viewport() -> Result<()> {
        let frame = Frame::filled(64, 48, [5, 5, 5])?;
        let renderer = renderer(32, 100)?;
        assert_eq!(renderer.render(&frame, &[]).dimensions(), (32, 24));
        Ok(())
    }

    #[test]
    fn preview_sink_replaces_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = PreviewSink::new(dir.path().join("preview.jpg"));
        sink.show(&RgbImage::new(8, 8))?;
        assert!(sink.path().exists());
        sink.clear();
        assert!(!sink.path().exists());
        Ok(())
    }

    #[test]
    fn preview_thread_shows_posted_frames_and_clears_on_close() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("live.jpg");
        let mailbox = Arc::new(Mailbox::new());
        let handle = PreviewSink::new(&path).spawn(Arc::clone(&mailbox))?;

        mailbox.post(RgbImage::new(16, 9));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !path.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(path.exists());

        mailbox.close();
        handle.join().expect("preview thread");
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn preview_thread_blanks_on_clear() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("live.jpg");
        let mailbox = Arc::new(Mailbox::new());
        let handle = PreviewSink::new(&path).spawn(Arc::clone(&mailbox))?;

        mailbox.post(RgbImage::new(16, 9));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !path.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(path.exists());

        mailbox.clear();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while path.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!path.exists(), "preview still shown after clear");

        mailbox.close();
        handle.join().expect("preview thread");
        Ok(())
    }
}
