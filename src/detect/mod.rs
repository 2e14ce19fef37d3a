//! Object detection.
//!
//! A detector is an opaque collaborator: the pipeline hands it a frame and
//! uses whatever detections come back. `build_detector` picks the backend
//! named in the model settings.

mod backend;
mod backends;
mod result;
pub mod yolo;

use anyhow::Result;

use crate::config::ModelSettings;

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection};

/// Construct and warm up the configured detector backend.
pub fn build_detector(settings: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    let mut backend: Box<dyn DetectorBackend> = match settings.backend.as_str() {
        "scripted" => match &settings.script_path {
            Some(path) => Box::new(ScriptedBackend::from_path(path)?),
            None => Box::new(ScriptedBackend::default()),
        },
        "tract" => build_tract(settings)?,
        other => anyhow::bail!("unknown model backend '{}'", other),
    };
    backend.warm_up()?;
    log::info!("detector backend '{}' ready", backend.name());
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    let labels = match &settings.labels_path {
        Some(path) => yolo::load_labels(path)?,
        None => Vec::new(),
    };
    let backend = TractBackend::new(&settings.path, settings.input_size, labels)?.with_params(
        yolo::DecodeParams {
            confidence_threshold: settings.confidence_threshold,
            iou_threshold: settings.iou_threshold,
            ..yolo::DecodeParams::default()
        },
    );
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    anyhow::bail!("the tract backend requires the backend-tract feature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BeaconConfig;

    #[test]
    fn builds_scripted_backend_without_script() -> Result<()> {
        let mut settings = BeaconConfig::default().model;
        settings.backend = "scripted".to_string();
        let backend = build_detector(&settings)?;
        assert_eq!(backend.name(), "scripted");
        Ok(())
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let mut settings = BeaconConfig::default().model;
        settings.backend = "darknet".to_string();
        assert!(build_detector(&settings).is_err());
    }
}
