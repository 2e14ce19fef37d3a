//! Post-processing for YOLO-family detection heads.
//!
//! The head emits a `[4 + C, P]` matrix per image: for each of `P` proposals,
//! a centre/size box in model-input pixels followed by `C` class scores.

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, Detection};

/// Thresholds applied while decoding.
#[derive(Clone, Copy, Debug)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

/// Decode a feature-major head output into detections in frame pixels.
///
/// `scale_x`/`scale_y` map model-input pixels back onto the frame.
pub fn decode(
    data: &[f32],
    num_features: usize,
    num_proposals: usize,
    labels: &[String],
    scale_x: f32,
    scale_y: f32,
    params: DecodeParams,
) -> Result<Vec<Detection>> {
    if num_features <= 4 {
        return Err(anyhow!("detection head has no class scores ({} features)", num_features));
    }
    if data.len() < num_features * num_proposals {
        return Err(anyhow!(
            "detection head output too short: {} < {}x{}",
            data.len(),
            num_features,
            num_proposals
        ));
    }
    let num_classes = num_features - 4;
    let at = |feature: usize, proposal: usize| data[feature * num_proposals + proposal];

    let mut candidates: Vec<(usize, Detection)> = Vec::new();
    for i in 0..num_proposals {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for c in 0..num_classes {
            let score = at(4 + c, i);
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score < params.confidence_threshold {
            continue;
        }

        let bbox = BoundingBox::from_center(
            at(0, i) * scale_x,
            at(1, i) * scale_y,
            at(2, i) * scale_x,
            at(3, i) * scale_y,
        );
        candidates.push((
            best_class,
            Detection::new(label_for(labels, best_class), bbox, best_score),
        ));
    }

    Ok(nms(candidates, params.iou_threshold, params.max_detections))
}

/// Class-aware non-maximum suppression, highest confidence first.
pub fn nms(
    mut candidates: Vec<(usize, Detection)>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));

    let mut kept: Vec<(usize, Detection)> = Vec::new();
    for (class, det) in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|(k, other)| *k == class && other.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            kept.push((class, det));
        }
    }
    kept.into_iter().map(|(_, det)| det).collect()
}

fn label_for(labels: &[String], class: usize) -> String {
    labels
        .get(class)
        .cloned()
        .unwrap_or_else(|| format!("class{}", class))
}

/// Read class names, one per line. Blank lines and `#` comments are skipped.
pub fn load_labels<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read labels file {}: {}", path.display(), e))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
