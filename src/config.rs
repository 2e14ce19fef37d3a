use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::CameraConfig;

#[cfg(windows)]
const DEFAULT_SERIAL_PATH: &str = "COM3";
#[cfg(not(windows))]
const DEFAULT_SERIAL_PATH: &str = "/dev/ttyUSB0";
const DEFAULT_SERIAL_BAUD: u32 = 115_200;
const DEFAULT_SETTLE_MS: u64 = 50;
const DEFAULT_LED_COUNT: u32 = 144;
const DEFAULT_TARGET_LABEL: &str = "pothole";
const DEFAULT_SAMPLE_PATH: &str = "sample_video.mp4";
const DEFAULT_MODEL_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "model.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_PREVIEW_PATH: &str = "preview.jpg";
const DEFAULT_STOP_GRACE_MS: u64 = 100;

#[derive(Debug, Deserialize, Default)]
struct BeaconConfigFile {
    serial: Option<SerialConfigFile>,
    strip: Option<StripConfigFile>,
    camera: Option<CameraConfigFile>,
    sample: Option<SampleConfigFile>,
    model: Option<ModelConfigFile>,
    display: Option<DisplayConfigFile>,
    stop_grace_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SerialConfigFile {
    path: Option<String>,
    baud: Option<u32>,
    settle_ms: Option<u64>,
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct StripConfigFile {
    led_count: Option<u32>,
    target_label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device_prefix: Option<String>,
    primary_index: Option<u32>,
    /// Set equal to `primary_index` to use a single camera.
    secondary_index: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SampleConfigFile {
    path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    script_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    /// `false` turns the preview off.
    enabled: Option<bool>,
    preview_path: Option<PathBuf>,
    viewport_width: Option<u32>,
    viewport_height: Option<u32>,
}

/// Startup configuration for the detection relay.
#[derive(Debug, Clone)]
pub struct BeaconConfig {
    pub serial: SerialSettings,
    pub strip: StripSettings,
    pub camera: CameraConfig,
    pub sample_path: String,
    pub model: ModelSettings,
    pub display: DisplaySettings,
    /// Delay between raising the stop flag and releasing the capture resource.
    pub stop_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub path: String,
    pub baud: u32,
    /// Pause after each successful write so the firmware can keep up.
    pub settle: Duration,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct StripSettings {
    pub led_count: u32,
    /// Case-insensitive substring selecting which detections light the strip.
    pub target_label: String,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// `tract` (ONNX model) or `scripted` (replayed detections).
    pub backend: String,
    pub path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    /// Where the latest annotated frame is written; `None` when the preview
    /// is disabled (`display.enabled: false` or `--no-preview`).
    pub preview_path: Option<PathBuf>,
    /// Viewport size; 0 means not yet known.
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        // An empty file section resolves every field to its default.
        Self::from_file(BeaconConfigFile::default())
    }
}

impl BeaconConfig {
    /// Load from the JSON file named by `BEACON_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("BEACON_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file instead of `BEACON_CONFIG`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BeaconConfigFile) -> Self {
        let serial = file.serial.unwrap_or_default();
        let strip = file.strip.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        let camera_defaults = CameraConfig::default();

        Self {
            serial: SerialSettings {
                path: serial
                    .path
                    .unwrap_or_else(|| DEFAULT_SERIAL_PATH.to_string()),
                baud: serial.baud.unwrap_or(DEFAULT_SERIAL_BAUD),
                settle: Duration::from_millis(serial.settle_ms.unwrap_or(DEFAULT_SETTLE_MS)),
                enabled: serial.enabled.unwrap_or(true),
            },
            strip: StripSettings {
                led_count: strip.led_count.unwrap_or(DEFAULT_LED_COUNT),
                target_label: strip
                    .target_label
                    .unwrap_or_else(|| DEFAULT_TARGET_LABEL.to_string()),
            },
            camera: CameraConfig {
                device_prefix: camera
                    .device_prefix
                    .unwrap_or(camera_defaults.device_prefix),
                primary_index: camera.primary_index.unwrap_or(camera_defaults.primary_index),
                secondary_index: camera.secondary_index.or(camera_defaults.secondary_index),
                width: camera.width.unwrap_or(camera_defaults.width),
                height: camera.height.unwrap_or(camera_defaults.height),
                target_fps: camera.target_fps.unwrap_or(camera_defaults.target_fps),
            },
            sample_path: file
                .sample
                .and_then(|sample| sample.path)
                .unwrap_or_else(|| DEFAULT_SAMPLE_PATH.to_string()),
            model: ModelSettings {
                backend: model
                    .backend
                    .unwrap_or_else(|| DEFAULT_MODEL_BACKEND.to_string()),
                path: model
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                labels_path: model.labels_path,
                script_path: model.script_path,
                input_size: model.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                confidence_threshold: model.confidence_threshold.unwrap_or(DEFAULT_CONFIDENCE),
                iou_threshold: model.iou_threshold.unwrap_or(DEFAULT_IOU),
            },
            display: DisplaySettings {
                preview_path: display.enabled.unwrap_or(true).then(|| {
                    display
                        .preview_path
                        .clone()
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_PREVIEW_PATH))
                }),
                viewport_width: display.viewport_width.unwrap_or(0),
                viewport_height: display.viewport_height.unwrap_or(0),
            },
            stop_grace: Duration::from_millis(file.stop_grace_ms.unwrap_or(DEFAULT_STOP_GRACE_MS)),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("BEACON_SERIAL_PATH") {
            if !path.trim().is_empty() {
                self.serial.path = path;
            }
        }
        if let Ok(baud) = std::env::var("BEACON_SERIAL_BAUD") {
            self.serial.baud = baud
                .parse()
                .map_err(|_| anyhow!("BEACON_SERIAL_BAUD must be an integer baud rate"))?;
        }
        if let Ok(label) = std::env::var("BEACON_TARGET_LABEL") {
            if !label.trim().is_empty() {
                self.strip.target_label = label;
            }
        }
        if let Ok(count) = std::env::var("BEACON_LED_COUNT") {
            self.strip.led_count = count
                .parse()
                .map_err(|_| anyhow!("BEACON_LED_COUNT must be an integer"))?;
        }
        if let Ok(path) = std::env::var("BEACON_SAMPLE_PATH") {
            if !path.trim().is_empty() {
                self.sample_path = path;
            }
        }
        if let Ok(path) = std::env::var("BEACON_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = PathBuf::from(path);
            }
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&mut self) -> Result<()> {
        if self.strip.led_count == 0 {
            return Err(anyhow!("strip.led_count must be greater than zero"));
        }
        self.strip.target_label = self.strip.target_label.trim().to_string();
        if self.strip.target_label.is_empty() {
            return Err(anyhow!("strip.target_label must not be empty"));
        }
        if self.serial.baud == 0 {
            return Err(anyhow!("serial.baud must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.model.input_size == 0 {
            return Err(anyhow!("model.input_size must be greater than zero"));
        }
        match self.model.backend.as_str() {
            "tract" | "scripted" => {}
            other => return Err(anyhow!("unknown model backend '{}'", other)),
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<BeaconConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
